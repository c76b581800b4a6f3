//! Remote execution of governed functions.
//!
//! A governed function is a SQL-defined, access-controlled function registered
//! in the data catalog as `catalog.schema.function`. We run it through the SQL
//! statement execution API on a warehouse and return its tabular result as-is.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
}

/// Fully qualified name of a governed function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionName {
    pub catalog: String,
    pub schema: String,
    pub function: String,
}

impl FunctionName {
    pub fn new(catalog: &str, schema: &str, function: &str) -> Result<Self> {
        for part in [catalog, schema, function] {
            if !IDENTIFIER.is_match(part) {
                return Err(anyhow!(
                    "Invalid function identifier part '{}', it must match [A-Za-z0-9_]+",
                    part
                ));
            }
        }
        Ok(Self {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            function: function.to_string(),
        })
    }
}

impl FromStr for FunctionName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split('.').collect::<Vec<_>>().as_slice() {
            [catalog, schema, function] => FunctionName::new(catalog, schema, function),
            _ => Err(anyhow!(
                "Function name '{}' must have the form catalog.schema.function",
                s
            )),
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.function)
    }
}

/// Tabular result of a governed function call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Set when the warehouse returned only part of the result inline
    #[serde(default)]
    pub truncated: bool,
}

/// Executes governed functions on the data platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FunctionClient: Send + Sync {
    async fn execute(
        &self,
        function: &FunctionName,
        parameters: Map<String, Value>,
    ) -> Result<FunctionResult>;
}

#[derive(Clone)]
pub struct DatabricksFunctionClientConfig {
    pub host: String,
    pub token: String,
    pub warehouse_id: String,
    /// How long the server may hold the submit call open, 5 to 50 seconds
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl DatabricksFunctionClientConfig {
    pub fn new(host: String, token: String, warehouse_id: String) -> Self {
        Self {
            host,
            token,
            warehouse_id,
            wait_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            max_polls: 60,
        }
    }
}

/// Runs governed functions through the SQL statement execution API
pub struct DatabricksFunctionClient {
    client: Client,
    config: DatabricksFunctionClientConfig,
}

impl DatabricksFunctionClient {
    pub fn new(config: DatabricksFunctionClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self { client, config })
    }

    fn statements_url(&self) -> String {
        format!(
            "{}/api/2.0/sql/statements",
            self.config.host.trim_end_matches('/')
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.config.token))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => {
                let err_text = response.text().await.unwrap_or_default();
                Err(anyhow!("Statement request failed: {}: {}", status, err_text))
            }
        }
    }

    async fn submit(&self, statement: String, parameters: Vec<Value>) -> Result<Value> {
        let payload = json!({
            "warehouse_id": self.config.warehouse_id,
            "statement": statement,
            "parameters": parameters,
            "wait_timeout": format!("{}s", self.config.wait_timeout.as_secs()),
            "on_wait_timeout": "CONTINUE",
            "disposition": "INLINE",
            "format": "JSON_ARRAY",
        });
        self.send(self.client.post(self.statements_url()).json(&payload))
            .await
    }

    async fn poll(&self, statement_id: &str) -> Result<Value> {
        let url = format!("{}/{}", self.statements_url(), statement_id);
        self.send(self.client.get(url)).await
    }
}

/// Build the SQL text and named parameters for a table function call.
/// Arguments are bound by name, so their order does not matter.
pub fn function_statement(
    function: &FunctionName,
    parameters: &Map<String, Value>,
) -> (String, Vec<Value>) {
    let placeholders: Vec<String> = parameters
        .keys()
        .map(|name| format!("{} => :{}", name, name))
        .collect();
    let statement = format!("SELECT * FROM {}({})", function, placeholders.join(", "));

    let params = parameters
        .iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => Value::String(s.clone()),
                Value::Null => Value::Null,
                other => Value::String(other.to_string()),
            };
            json!({ "name": name, "value": value })
        })
        .collect();

    (statement, params)
}

fn statement_state(response: &Value) -> &str {
    response["status"]["state"].as_str().unwrap_or("UNKNOWN")
}

/// Pull column names and inline rows out of a finished statement
pub fn parse_statement_result(response: &Value) -> Result<FunctionResult> {
    let columns = response["manifest"]["schema"]["columns"]
        .as_array()
        .map(|columns| {
            columns
                .iter()
                .filter_map(|c| c["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let rows = match response["result"]["data_array"].as_array() {
        Some(rows) => rows
            .iter()
            .map(|row| {
                row.as_array()
                    .cloned()
                    .ok_or_else(|| anyhow!("Malformed result row: {}", row))
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let truncated = response["manifest"]["truncated"].as_bool().unwrap_or(false)
        || response["result"]["next_chunk_index"].is_number();

    Ok(FunctionResult {
        columns,
        rows,
        truncated,
    })
}

#[async_trait]
impl FunctionClient for DatabricksFunctionClient {
    async fn execute(
        &self,
        function: &FunctionName,
        parameters: Map<String, Value>,
    ) -> Result<FunctionResult> {
        let (statement, params) = function_statement(function, &parameters);
        tracing::debug!(%function, %statement, "executing governed function");

        let mut response = self
            .submit(statement, params)
            .await
            .with_context(|| format!("Failed to execute {}", function))?;

        let mut polls = 0;
        loop {
            let state = statement_state(&response).to_string();
            match state.as_str() {
                "SUCCEEDED" => break,
                "PENDING" | "RUNNING" => {
                    polls += 1;
                    if polls > self.config.max_polls {
                        return Err(anyhow!(
                            "{} did not finish after {} polls",
                            function,
                            self.config.max_polls
                        ));
                    }
                    let statement_id = response["statement_id"]
                        .as_str()
                        .ok_or_else(|| anyhow!("Pending statement has no statement_id"))?
                        .to_string();
                    tokio::time::sleep(self.config.poll_interval).await;
                    response = self.poll(&statement_id).await?;
                }
                state => {
                    let message = response["status"]["error"]["message"]
                        .as_str()
                        .unwrap_or("no error message");
                    return Err(anyhow!("{} ended in state {}: {}", function, state, message));
                }
            }
        }

        let result = parse_statement_result(&response)?;
        tracing::debug!(%function, rows = result.rows.len(), "governed function finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn claims_function() -> FunctionName {
        "main.insurance_agent.lookup_claims".parse().unwrap()
    }

    fn client(host: String) -> DatabricksFunctionClient {
        let mut config =
            DatabricksFunctionClientConfig::new(host, "test_token".to_string(), "wh-1".to_string());
        config.poll_interval = Duration::from_millis(1);
        config.max_polls = 2;
        DatabricksFunctionClient::new(config).unwrap()
    }

    fn params(policy_no: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("policy_no".to_string(), json!(policy_no));
        map
    }

    fn succeeded() -> Value {
        json!({
            "statement_id": "st-1",
            "status": {"state": "SUCCEEDED"},
            "manifest": {"schema": {"columns": [
                {"name": "claim_id"}, {"name": "claim_status"}
            ]}},
            "result": {"data_array": [["CLM-1", "Open"]]}
        })
    }

    #[test]
    fn test_function_name_parsing() {
        let name = claims_function();
        assert_eq!(name.catalog, "main");
        assert_eq!(name.schema, "insurance_agent");
        assert_eq!(name.function, "lookup_claims");
        assert_eq!(name.to_string(), "main.insurance_agent.lookup_claims");

        assert!("lookup_claims".parse::<FunctionName>().is_err());
        assert!("a.b.c.d".parse::<FunctionName>().is_err());
        assert!("main.schema.drop table".parse::<FunctionName>().is_err());
        assert!("main..lookup".parse::<FunctionName>().is_err());
    }

    #[test]
    fn test_function_statement() {
        let mut parameters = params("102070455");
        parameters.insert("limit".to_string(), json!(5));

        let (statement, params) = function_statement(&claims_function(), &parameters);

        assert_eq!(
            statement,
            "SELECT * FROM main.insurance_agent.lookup_claims(limit => :limit, policy_no => :policy_no)"
        );
        assert_eq!(
            params,
            vec![
                json!({"name": "limit", "value": "5"}),
                json!({"name": "policy_no", "value": "102070455"}),
            ]
        );
    }

    #[test]
    fn test_parse_statement_result_without_rows() -> Result<()> {
        let result = parse_statement_result(&json!({
            "status": {"state": "SUCCEEDED"},
            "manifest": {"schema": {"columns": [{"name": "claim_id"}]}},
            "result": {}
        }))?;
        assert_eq!(result.columns, vec!["claim_id"]);
        assert!(result.rows.is_empty());
        assert!(!result.truncated);
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_inline_result() -> Result<()> {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/2.0/sql/statements"))
            .and(header("Authorization", "Bearer test_token"))
            .and(body_partial_json(json!({
                "warehouse_id": "wh-1",
                "statement": "SELECT * FROM main.insurance_agent.lookup_claims(policy_no => :policy_no)",
                "parameters": [{"name": "policy_no", "value": "102070455"}],
                "wait_timeout": "30s"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(succeeded()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client(mock_server.uri())
            .execute(&claims_function(), params("102070455"))
            .await?;

        assert_eq!(result.columns, vec!["claim_id", "claim_status"]);
        assert_eq!(result.rows, vec![vec![json!("CLM-1"), json!("Open")]]);
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_polls_pending_statement() -> Result<()> {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/2.0/sql/statements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statement_id": "st-1",
                "status": {"state": "PENDING"}
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/sql/statements/st-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(succeeded()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client(mock_server.uri())
            .execute(&claims_function(), params("102070455"))
            .await?;
        assert_eq!(result.rows.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_gives_up_after_max_polls() {
        let mock_server = MockServer::start().await;

        let running = json!({"statement_id": "st-1", "status": {"state": "RUNNING"}});
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(running.clone()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(running))
            .mount(&mock_server)
            .await;

        let err = client(mock_server.uri())
            .execute(&claims_function(), params("1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not finish after 2 polls"));
    }

    #[tokio::test]
    async fn test_execute_failed_statement() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statement_id": "st-1",
                "status": {
                    "state": "FAILED",
                    "error": {"message": "PERMISSION_DENIED: User does not have EXECUTE"}
                }
            })))
            .mount(&mock_server)
            .await;

        let err = client(mock_server.uri())
            .execute(&claims_function(), params("1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ended in state FAILED"));
        assert!(err.to_string().contains("PERMISSION_DENIED"));
    }

    #[tokio::test]
    async fn test_execute_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("invalid token"))
            .mount(&mock_server)
            .await;

        let err = client(mock_server.uri())
            .execute(&claims_function(), params("1"))
            .await
            .unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("Failed to execute main.insurance_agent.lookup_claims"));
        assert!(chain.contains("403"));
    }
}
