use std::sync::Arc;

use agent_primitives::{SecurityLevel, ToolTag};
use agent_tools::registry::{ToolDescriptor, ToolError, ToolResult};
use agent_tools::schema::ToolSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ResearchError;
use crate::orchestrator::{DEFAULT_MAX_SOURCES, ResearchOptions, ResearchOrchestrator};

/// Registry name of the research tool.
pub const RESEARCH_TOOL_NAME: &str = "research";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ResearchInput {
    query: String,
    #[serde(default)]
    academic_only: bool,
    #[serde(default)]
    max_sources: Option<usize>,
}

impl ResearchInput {
    fn parse(input: Value) -> Result<Self, ResearchError> {
        let input: Self = serde_json::from_value(input)
            .map_err(|err| ResearchError::invalid_request(err.to_string()))?;
        if input.query.trim().is_empty() {
            return Err(ResearchError::invalid_request("query cannot be blank"));
        }
        Ok(input)
    }

    fn options(&self) -> ResearchOptions {
        ResearchOptions::default()
            .academic_only(self.academic_only)
            .max_sources(self.max_sources.unwrap_or(DEFAULT_MAX_SOURCES))
    }
}

/// Wraps `orchestrator` as a registry tool.
///
/// Input is `{ "query": string, "academicOnly"?: bool, "maxSources"?: int }`;
/// output is the JSON array of results.
///
/// # Errors
///
/// Returns [`ToolError::InvalidDescriptor`] if the input schema fails to
/// compile.
pub fn research_tool(orchestrator: Arc<ResearchOrchestrator>) -> ToolResult<ToolDescriptor> {
    let input_schema = ToolSchema::json_schema(json!({
        "type": "object",
        "required": ["query"],
        "properties": {
            "query": { "type": "string", "minLength": 1 },
            "academicOnly": { "type": "boolean" },
            "maxSources": { "type": "integer", "minimum": 1 }
        },
        "additionalProperties": false
    }))?;
    let output_schema = ToolSchema::json_schema(json!({ "type": "array" }))?;

    ToolDescriptor::builder(RESEARCH_TOOL_NAME, env!("CARGO_PKG_VERSION"))
        .description("Searches web and academic sources and returns ranked, deduplicated results")
        .tags([ToolTag::Web, ToolTag::Academic])
        .security_level(SecurityLevel::Network)
        .input_schema(input_schema)
        .output_schema(output_schema)
        .build(move |input: Value| {
            let orchestrator = Arc::clone(&orchestrator);
            async move {
                let input = ResearchInput::parse(input).map_err(|err| ToolError::InvalidInput {
                    name: RESEARCH_TOOL_NAME.to_owned(),
                    reason: err.to_string(),
                })?;
                let results = orchestrator
                    .research(&input.query, input.options())
                    .await
                    .map_err(|err| ToolError::execution(err.to_string()))?;
                serde_json::to_value(results).map_err(|err| ToolError::execution(err.to_string()))
            }
        })
}

#[cfg(test)]
mod tests {
    use agent_adapters::traits::{AdapterResult, SearchRequest, SourceConnector};
    use agent_primitives::{SearchResult, SourceType};
    use agent_tools::registry::ToolRegistry;
    use async_trait::async_trait;

    use super::*;

    struct Fixed(SourceType, &'static [&'static str]);

    #[async_trait]
    impl SourceConnector for Fixed {
        fn name(&self) -> &str {
            self.0.as_str()
        }

        fn source_type(&self) -> SourceType {
            self.0
        }

        fn default_budget(&self) -> usize {
            self.1.len()
        }

        async fn search(&self, _request: &SearchRequest) -> AdapterResult<Vec<SearchResult>> {
            Ok(self
                .1
                .iter()
                .map(|url| SearchResult::builder(*url, *url, self.0).build().unwrap())
                .collect())
        }
    }

    fn registry() -> ToolRegistry {
        let orchestrator = ResearchOrchestrator::builder()
            .connector(Arc::new(Fixed(SourceType::Web, &["https://w1", "https://w2"])))
            .connector(Arc::new(Fixed(SourceType::Academic, &["https://p1"])))
            .build();
        let registry = ToolRegistry::new();
        registry.register(research_tool(Arc::new(orchestrator)).unwrap());
        registry
    }

    #[test]
    fn descriptor_contract() {
        let registry = registry();
        let tool = registry.find(RESEARCH_TOOL_NAME).unwrap();
        assert_eq!(tool.security_level(), SecurityLevel::Network);
        assert!(tool.has_tag(ToolTag::Web));
        assert!(tool.has_tag(ToolTag::Academic));
        assert!(tool.input_schema().is_enforced());
    }

    #[tokio::test]
    async fn returns_results_as_json() {
        let output = registry()
            .invoke(RESEARCH_TOOL_NAME, json!({ "query": "q", "maxSources": 2 }))
            .await
            .unwrap();

        let urls: Vec<_> = output
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["url"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(urls, ["https://w1", "https://w2"]);
        assert_eq!(output[0]["sourceType"], "web");
    }

    #[tokio::test]
    async fn academic_only_flag_is_honoured() {
        let output = registry()
            .invoke(RESEARCH_TOOL_NAME, json!({ "query": "q", "academicOnly": true }))
            .await
            .unwrap();
        assert_eq!(
            output,
            json!([{
                "id": "https://p1",
                "title": "",
                "url": "https://p1",
                "snippet": "",
                "sourceType": "academic"
            }])
        );
    }

    #[tokio::test]
    async fn malformed_input_is_rejected_before_running() {
        let registry = registry();
        let inputs = [
            json!({}),
            json!({ "query": "" }),
            json!({ "query": " \t" }),
            json!({ "query": "q", "extra": 1 }),
        ];
        for input in inputs {
            let err = registry.invoke(RESEARCH_TOOL_NAME, input).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidInput { .. }), "{err:?}");
        }
    }

    #[tokio::test]
    async fn direct_execution_still_checks_input() {
        let tool = registry().find(RESEARCH_TOOL_NAME).unwrap();
        let err = tool.execute(json!({ "query": "   " })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }
}
