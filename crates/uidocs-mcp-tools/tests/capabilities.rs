use std::fs;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tempfile::TempDir;
use uidocs_mcp_core::CallToolParams;
use uidocs_mcp_tools::{CapabilitySet, DocsLayout, DocsLibrary, ToolError};
use uidocs_mirror::LocalDocsDir;

const BUTTON: &str = r#"---
title: Button
description: Displays a button or a component that looks like a button.
---

import { Button } from "@/registry/new-york/ui/button"

<ComponentPreview name="button-demo" />

## Usage

```tsx
import { Button } from "@/components/ui/button"
```

```tsx
<Button variant="outline">Button</Button>
```

## API Reference

| Prop | Type | Default |
| ---- | ---- | ------- |
| variant | "default" \| "outline" | "default" |
"#;

const CARD: &str = r#"---
title: Card
description: Displays a card with header, content, and footer.
---

## Installation

<Steps>

Copy the card component.

</Steps>
"#;

fn fixture() -> (TempDir, CapabilitySet) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("button.mdx"), BUTTON).unwrap();
    fs::write(dir.path().join("card.mdx"), CARD).unwrap();
    fs::write(dir.path().join("README.md"), "not a component").unwrap();
    fs::write(dir.path().join("Bad_Name.mdx"), "skipped").unwrap();

    let mirror = Arc::new(LocalDocsDir::new(dir.path()));
    let library = DocsLibrary::new(mirror, DocsLayout::default()).unwrap();
    (dir, CapabilitySet::new(library))
}

fn call(name: &str, arguments: Value) -> CallToolParams {
    let arguments: Option<Map<String, Value>> = arguments.as_object().cloned();
    CallToolParams {
        name: name.to_string(),
        arguments,
    }
}

#[tokio::test]
async fn lists_components_sorted() {
    let (_dir, caps) = fixture();
    let result = caps.call_tool(call("list_components", json!({}))).await.unwrap();
    assert!(!result.is_error);

    let listed: Value = serde_json::from_str(result.content[0].as_text()).unwrap();
    let names: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["button", "card"]);
    assert_eq!(listed[0]["title"], json!("Button"));
}

#[tokio::test]
async fn component_docs_are_cleaned() {
    let (_dir, caps) = fixture();
    let result = caps
        .call_tool(call("get_component_docs", json!({"name": "card"})))
        .await
        .unwrap();
    let text = result.content[0].as_text();
    assert!(text.starts_with("# Card\n\nDisplays a card"));
    assert!(text.contains("Copy the card component."));
    assert!(!text.contains("<Steps>"));
}

#[tokio::test]
async fn api_and_examples() {
    let (_dir, caps) = fixture();
    let api = caps
        .call_tool(call("get_component_api", json!({"name": "button"})))
        .await
        .unwrap();
    assert!(api.content[0].as_text().starts_with("## API Reference"));

    let examples = caps
        .call_tool(call("get_component_examples", json!({"name": "button", "limit": 1})))
        .await
        .unwrap();
    let text = examples.content[0].as_text();
    assert!(text.starts_with("```tsx\nimport { Button }"));
    assert!(!text.contains("variant=\"outline\""));
}

#[tokio::test]
async fn client_faults_are_tool_errors() {
    let (_dir, caps) = fixture();

    let missing = caps
        .call_tool(call("get_component_docs", json!({"name": "nope"})))
        .await
        .unwrap();
    assert!(missing.is_error);
    assert!(missing.content[0].as_text().contains("nope"));

    let traversal = caps
        .call_tool(call("get_component_docs", json!({"name": "../secrets"})))
        .await
        .unwrap();
    assert!(traversal.is_error);

    let no_section = caps
        .call_tool(call("get_component_api", json!({"name": "card"})))
        .await
        .unwrap();
    assert!(no_section.is_error);

    let bad_args = caps.call_tool(call("get_component_section", json!({"name": "card"}))).await.unwrap();
    assert!(bad_args.is_error);
}

#[tokio::test]
async fn unknown_tool_is_a_protocol_error() {
    let (_dir, caps) = fixture();
    let err = caps.call_tool(call("rm_rf", json!({}))).await.unwrap_err();
    assert!(matches!(err, ToolError::UnknownTool(_)));
    assert_eq!(err.to_rpc_error().unwrap().code, -32602);
}

#[tokio::test]
async fn search_ranks_by_relevance() {
    let (_dir, caps) = fixture();
    let result = caps
        .call_tool(call("search_components", json!({"query": "button"})))
        .await
        .unwrap();
    let found: Value = serde_json::from_str(result.content[0].as_text()).unwrap();
    assert_eq!(found[0]["name"], json!("button"));
    assert_eq!(found.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn resources_read() {
    let (_dir, caps) = fixture();
    assert_eq!(caps.list_resources().len(), 2);
    assert_eq!(caps.list_resource_templates().len(), 1);

    let page = caps.read_resource("uidocs://components/button").await.unwrap();
    assert_eq!(page.contents[0].mime_type.as_deref(), Some("text/markdown"));
    assert!(page.contents[0].text.starts_with("# Button"));

    let status = caps.read_resource("uidocs://mirror/status").await.unwrap();
    let status: Value = serde_json::from_str(&status.contents[0].text).unwrap();
    assert_eq!(status["structurally_valid"], json!(true));

    let err = caps.read_resource("uidocs://components/ghost").await.unwrap_err();
    assert_eq!(err.to_rpc_error().unwrap().code, -32002);
    assert!(caps.read_resource("file:///etc/passwd").await.is_err());
}

#[tokio::test]
async fn missing_mirror_degrades_to_tool_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Arc::new(LocalDocsDir::new(dir.path().join("absent")));
    let caps = CapabilitySet::new(DocsLibrary::new(mirror, DocsLayout::default()).unwrap());

    let listed = caps.call_tool(call("list_components", json!({}))).await.unwrap();
    assert!(listed.is_error);
    let docs = caps
        .call_tool(call("get_component_docs", json!({"name": "button"})))
        .await
        .unwrap();
    assert!(docs.is_error);
}
