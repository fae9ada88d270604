// ABOUTME: Immutable table of tools and resources bound into every MCP endpoint
// ABOUTME: Closed DocsTool enum with schemars-derived input schemas and their handlers

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use uidocs_mcp_core::{
    CallToolParams, CallToolResult, Content, ReadResourceResult, Resource, ResourceContents,
    ResourceTemplate, ResourcesCapability, ServerCapabilities, Tool, ToolsCapability,
};

use crate::catalog::{ComponentName, DocsLibrary};
use crate::markdown::{extract_code_blocks, extract_first_section, extract_section};
use crate::ToolError;

pub const COMPONENTS_URI: &str = "uidocs://components";
pub const MIRROR_STATUS_URI: &str = "uidocs://mirror/status";
pub const COMPONENT_URI_PREFIX: &str = "uidocs://components/";
pub const COMPONENT_URI_TEMPLATE: &str = "uidocs://components/{name}";

const API_HEADINGS: &[&str] = &["API Reference", "API", "Props"];
const EXAMPLE_HEADINGS: &[&str] = &["Examples", "Usage"];
const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_EXAMPLE_LIMIT: usize = 20;

#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
struct ComponentArgs {
    /// Component slug, e.g. `button` or `dropdown-menu`
    name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExamplesArgs {
    /// Component slug, e.g. `button` or `dropdown-menu`
    name: String,
    /// Maximum number of code blocks to return
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SectionArgs {
    /// Component slug, e.g. `button` or `dropdown-menu`
    name: String,
    /// Heading of the section, matched case-insensitively
    section: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchArgs {
    /// Free-text query matched against names, titles and descriptions
    query: String,
    /// Maximum number of results (default: 10)
    #[serde(default)]
    limit: Option<usize>,
}

/// Every tool the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocsTool {
    ListComponents,
    GetComponentDocs,
    GetComponentApi,
    GetComponentExamples,
    GetComponentSection,
    SearchComponents,
}

impl DocsTool {
    pub const ALL: [DocsTool; 6] = [
        DocsTool::ListComponents,
        DocsTool::GetComponentDocs,
        DocsTool::GetComponentApi,
        DocsTool::GetComponentExamples,
        DocsTool::GetComponentSection,
        DocsTool::SearchComponents,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DocsTool::ListComponents => "list_components",
            DocsTool::GetComponentDocs => "get_component_docs",
            DocsTool::GetComponentApi => "get_component_api",
            DocsTool::GetComponentExamples => "get_component_examples",
            DocsTool::GetComponentSection => "get_component_section",
            DocsTool::SearchComponents => "search_components",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            DocsTool::ListComponents => {
                "List every documented component with its title and short description."
            }
            DocsTool::GetComponentDocs => {
                "Full documentation page for a component, cleaned to plain markdown."
            }
            DocsTool::GetComponentApi => {
                "API reference (props, variants) section of a component's documentation."
            }
            DocsTool::GetComponentExamples => {
                "Code examples from a component's Examples or Usage sections."
            }
            DocsTool::GetComponentSection => {
                "Any section of a component's documentation, selected by heading."
            }
            DocsTool::SearchComponents => {
                "Search components by name, title and description."
            }
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            DocsTool::ListComponents => schema_value::<NoArgs>(),
            DocsTool::GetComponentDocs | DocsTool::GetComponentApi => {
                schema_value::<ComponentArgs>()
            }
            DocsTool::GetComponentExamples => schema_value::<ExamplesArgs>(),
            DocsTool::GetComponentSection => schema_value::<SectionArgs>(),
            DocsTool::SearchComponents => schema_value::<SearchArgs>(),
        }
    }

    pub fn descriptor(self) -> Tool {
        Tool {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| json!({ "type": "object" }))
}

fn parse_args<T: DeserializeOwned>(arguments: Option<Map<String, Value>>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// The fixed catalog bound into every endpoint; built once at startup.
pub struct CapabilitySet {
    library: DocsLibrary,
    tools: Vec<Tool>,
    resources: Vec<Resource>,
    templates: Vec<ResourceTemplate>,
}

impl CapabilitySet {
    pub fn new(library: DocsLibrary) -> Self {
        let tools = DocsTool::ALL.into_iter().map(DocsTool::descriptor).collect();
        let resources = vec![
            Resource {
                uri: COMPONENTS_URI.to_string(),
                name: "components".to_string(),
                description: Some("Catalog of documented components".to_string()),
                mime_type: Some("application/json".to_string()),
            },
            Resource {
                uri: MIRROR_STATUS_URI.to_string(),
                name: "mirror-status".to_string(),
                description: Some("Health of the local documentation mirror".to_string()),
                mime_type: Some("application/json".to_string()),
            },
        ];
        let templates = vec![ResourceTemplate {
            uri_template: COMPONENT_URI_TEMPLATE.to_string(),
            name: "component".to_string(),
            description: Some("Cleaned documentation page of one component".to_string()),
            mime_type: Some("text/markdown".to_string()),
        }];
        Self {
            library,
            tools,
            resources,
            templates,
        }
    }

    pub fn library(&self) -> &DocsLibrary {
        &self.library
    }

    pub fn server_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
            resources: Some(ResourcesCapability {
                subscribe: Some(false),
                list_changed: Some(true),
            }),
        }
    }

    pub fn list_tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn list_resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn list_resource_templates(&self) -> &[ResourceTemplate] {
        &self.templates
    }

    /// Run a tool. Client faults come back as `isError` results; an unknown
    /// tool or an internal fault is an `Err`.
    pub async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, ToolError> {
        let tool = DocsTool::from_name(&params.name)
            .ok_or_else(|| ToolError::UnknownTool(params.name.clone()))?;

        match self.run_tool(tool, params.arguments).await {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) if e.is_client_fault() => {
                debug!(tool = tool.name(), error = %e, "Tool call rejected");
                Ok(CallToolResult::error(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn run_tool(
        &self,
        tool: DocsTool,
        arguments: Option<Map<String, Value>>,
    ) -> Result<String, ToolError> {
        match tool {
            DocsTool::ListComponents => {
                let _: NoArgs = parse_args(arguments)?;
                let components = self.library.list().await?;
                Ok(serde_json::to_string_pretty(&components)?)
            }
            DocsTool::GetComponentDocs => {
                let args: ComponentArgs = parse_args(arguments)?;
                let doc = self.library.load(&ComponentName::parse(&args.name)?).await?;
                Ok(self.library.render(&doc))
            }
            DocsTool::GetComponentApi => {
                let args: ComponentArgs = parse_args(arguments)?;
                let name = ComponentName::parse(&args.name)?;
                let doc = self.library.load(&name).await?;
                let cleaned = self.library.strip(&doc.body);
                extract_first_section(&cleaned, API_HEADINGS).ok_or_else(|| {
                    ToolError::SectionNotFound {
                        component: name.to_string(),
                        section: "API Reference".into(),
                    }
                })
            }
            DocsTool::GetComponentExamples => {
                let args: ExamplesArgs = parse_args(arguments)?;
                let name = ComponentName::parse(&args.name)?;
                let doc = self.library.load(&name).await?;
                let limit = args.limit.unwrap_or(DEFAULT_EXAMPLE_LIMIT);

                let mut blocks: Vec<_> = EXAMPLE_HEADINGS
                    .iter()
                    .filter_map(|heading| extract_section(&doc.body, heading))
                    .flat_map(|section| extract_code_blocks(&section))
                    .collect();
                if blocks.is_empty() {
                    blocks = extract_code_blocks(&doc.body);
                }
                if blocks.is_empty() {
                    return Err(ToolError::SectionNotFound {
                        component: name.to_string(),
                        section: "examples".into(),
                    });
                }

                let rendered: Vec<String> = blocks
                    .into_iter()
                    .take(limit)
                    .map(|block| {
                        format!(
                            "```{}\n{}\n```",
                            block.language.as_deref().unwrap_or_default(),
                            block.code
                        )
                    })
                    .collect();
                Ok(rendered.join("\n\n"))
            }
            DocsTool::GetComponentSection => {
                let args: SectionArgs = parse_args(arguments)?;
                let name = ComponentName::parse(&args.name)?;
                let doc = self.library.load(&name).await?;
                let cleaned = self.library.strip(&doc.body);
                extract_section(&cleaned, &args.section).ok_or_else(|| ToolError::SectionNotFound {
                    component: name.to_string(),
                    section: args.section.clone(),
                })
            }
            DocsTool::SearchComponents => {
                let args: SearchArgs = parse_args(arguments)?;
                let limit = args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
                let matches = self.library.search(&args.query, limit).await?;
                Ok(serde_json::to_string_pretty(&matches)?)
            }
        }
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ToolError> {
        let not_found = |_| ToolError::ResourceNotFound(uri.to_string());

        let (mime_type, text) = match uri {
            COMPONENTS_URI => {
                let components = self.library.list().await.map_err(|e| {
                    if e.is_client_fault() {
                        ToolError::ResourceNotFound(uri.to_string())
                    } else {
                        e
                    }
                })?;
                ("application/json", serde_json::to_string_pretty(&components)?)
            }
            MIRROR_STATUS_URI => {
                let status = self.library.mirror().status().await;
                ("application/json", serde_json::to_string_pretty(&status)?)
            }
            _ => {
                let raw = uri
                    .strip_prefix(COMPONENT_URI_PREFIX)
                    .ok_or_else(|| ToolError::ResourceNotFound(uri.to_string()))?;
                let name = ComponentName::parse(raw).map_err(not_found)?;
                let doc = self.library.load(&name).await.map_err(|e| match e {
                    ToolError::ComponentNotFound(_) => ToolError::ResourceNotFound(uri.to_string()),
                    other => other,
                })?;
                ("text/markdown", self.library.render(&doc))
            }
        };

        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: Some(mime_type.to_string()),
                text,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_round_trip() {
        for tool in DocsTool::ALL {
            assert_eq!(DocsTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(DocsTool::from_name("drop_database"), None);
    }

    #[test]
    fn test_input_schemas_are_objects_with_required_fields() {
        let schema = DocsTool::GetComponentSection.input_schema();
        assert_eq!(schema["type"], json!("object"));
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"name"));
        assert!(required.contains(&"section"));

        let list = DocsTool::ListComponents.input_schema();
        assert_eq!(list["type"], json!("object"));
    }

    #[test]
    fn test_parse_args_reports_invalid_arguments() {
        let err = parse_args::<ComponentArgs>(None).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(err.is_client_fault());
    }
}
