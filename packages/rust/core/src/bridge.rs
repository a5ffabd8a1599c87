//! Subprocess bridge to external analysis and title-mapping capabilities.
//!
//! Each request spawns the configured command, writes one JSON line to its
//! stdin, closes it, and reads one JSON line back from stdout. The bridge's
//! stderr is inherited so its logs land next to ours.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument};

use docoutline_shared::{BridgeConfig, FlatNode, OutlineError, Result, TitleCorrection, TocItem};

use crate::enrichment::NodeAnalyzer;
use crate::toc::TitleMapper;

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Request message sent to the bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum RequestMessage<'a> {
    #[serde(rename = "analyze")]
    Analyze {
        text: &'a str,
        title: &'a str,
        type_hint: Option<&'a str>,
    },
    #[serde(rename = "map_titles")]
    MapTitles {
        nodes: &'a [FlatNode],
        toc_items: &'a [TocItem],
    },
}

/// Response message received from the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseMessage {
    #[serde(rename = "analysis")]
    Analysis { analysis: Value },
    #[serde(rename = "mappings")]
    Mappings { mappings: Vec<TitleCorrection> },
    #[serde(rename = "error")]
    Error { error: String },
}

// ---------------------------------------------------------------------------
// Bridge command
// ---------------------------------------------------------------------------

/// A configured bridge executable.
#[derive(Debug, Clone)]
pub struct BridgeCommand {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl BridgeCommand {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Build from config. Fails when no command is configured.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let command = config
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| OutlineError::config("bridge.command is not set"))?;

        let mut bridge = Self::new(command, config.args.clone());
        if let Some(dir) = &config.working_dir {
            bridge = bridge.working_dir(dir);
        }
        Ok(bridge)
    }

    /// Run one request/response exchange.
    async fn exchange(&self, request: &RequestMessage<'_>) -> Result<ResponseMessage> {
        let json = serde_json::to_string(request)
            .map_err(|e| OutlineError::Bridge(format!("failed to serialize request: {e}")))?;

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            OutlineError::Bridge(format!(
                "failed to spawn bridge: {e}. Is `{}` installed?",
                self.command
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OutlineError::Bridge("failed to capture bridge stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OutlineError::Bridge("failed to capture bridge stdout".into()))?;

        stdin
            .write_all(format!("{json}\n").as_bytes())
            .await
            .map_err(|e| OutlineError::Bridge(format!("failed to write to bridge stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| OutlineError::Bridge(format!("failed to flush bridge stdin: {e}")))?;
        drop(stdin);

        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .await
            .map_err(|e| OutlineError::Bridge(format!("bridge read error: {e}")))?;

        let status = child
            .wait()
            .await
            .map_err(|e| OutlineError::Bridge(format!("bridge wait error: {e}")))?;
        debug!(?status, bytes = line.len(), "bridge exited");

        if line.trim().is_empty() {
            return Err(OutlineError::Bridge(format!(
                "bridge produced no response (exit status: {status})"
            )));
        }

        parse_response(&line)
    }
}

fn parse_response(line: &str) -> Result<ResponseMessage> {
    serde_json::from_str(line.trim()).map_err(|e| {
        let preview: String = line.chars().take(200).collect();
        OutlineError::Bridge(format!("invalid bridge response: {e} (got: {preview})"))
    })
}

#[async_trait]
impl NodeAnalyzer for BridgeCommand {
    #[instrument(skip_all, fields(title = %title, chars = text.len()))]
    async fn analyze(&self, text: &str, title: &str, kind: Option<&str>) -> Result<Value> {
        let request = RequestMessage::Analyze {
            text,
            title,
            type_hint: kind,
        };
        match self.exchange(&request).await? {
            ResponseMessage::Analysis { analysis } => Ok(analysis),
            ResponseMessage::Error { error } => Err(OutlineError::Enrichment(error)),
            ResponseMessage::Mappings { .. } => Err(OutlineError::Bridge(
                "unexpected mappings response to analyze request".into(),
            )),
        }
    }
}

#[async_trait]
impl TitleMapper for BridgeCommand {
    #[instrument(skip_all, fields(nodes = nodes.len(), items = toc_items.len()))]
    async fn map_titles(
        &self,
        nodes: &[FlatNode],
        toc_items: &[TocItem],
    ) -> Result<Vec<TitleCorrection>> {
        let request = RequestMessage::MapTitles { nodes, toc_items };
        match self.exchange(&request).await? {
            ResponseMessage::Mappings { mappings } => Ok(mappings),
            ResponseMessage::Error { error } => Err(OutlineError::Mapping(error)),
            ResponseMessage::Analysis { .. } => Err(OutlineError::Bridge(
                "unexpected analysis response to map_titles request".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_request_serializes_correctly() {
        let msg = RequestMessage::Analyze {
            text: "body",
            title: "Intro",
            type_hint: Some("expansion"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"analyze""#));
        assert!(json.contains(r#""title":"Intro""#));
        assert!(json.contains(r#""type_hint":"expansion""#));
    }

    #[test]
    fn map_titles_request_serializes_correctly() {
        let nodes = vec![FlatNode {
            node_id: "chapter_1".into(),
            title: "Intro".into(),
            level: 1,
        }];
        let items = vec![TocItem::new("Introduction", 1)];
        let msg = RequestMessage::MapTitles {
            nodes: &nodes,
            toc_items: &items,
        };
        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "map_titles");
        assert_eq!(value["nodes"][0]["node_id"], "chapter_1");
        assert_eq!(value["toc_items"][0]["title"], "Introduction");
    }

    #[test]
    fn response_deserializes_analysis() {
        let msg = parse_response(r#"{"type":"analysis","analysis":{"summary":"s"}}"#).unwrap();
        match msg {
            ResponseMessage::Analysis { analysis } => assert_eq!(analysis["summary"], "s"),
            other => panic!("expected Analysis, got {other:?}"),
        }
    }

    #[test]
    fn response_deserializes_mappings() {
        let line = r#"{"type":"mappings","mappings":[{"node_id":"chapter_1","new_title":"1 Intro"}]}"#;
        match parse_response(line).unwrap() {
            ResponseMessage::Mappings { mappings } => {
                assert_eq!(mappings.len(), 1);
                assert_eq!(mappings[0].new_title, "1 Intro");
            }
            other => panic!("expected Mappings, got {other:?}"),
        }
    }

    #[test]
    fn response_deserializes_error() {
        match parse_response("{\"type\":\"error\",\"error\":\"rate limited\"}\n").unwrap() {
            ResponseMessage::Error { error } => assert_eq!(error, "rate limited"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_response_is_bridge_error() {
        assert!(matches!(
            parse_response("hello"),
            Err(OutlineError::Bridge(_))
        ));
    }

    #[test]
    fn from_config_requires_command() {
        assert!(matches!(
            BridgeCommand::from_config(&BridgeConfig::default()),
            Err(OutlineError::Config { .. })
        ));

        let config = BridgeConfig {
            command: Some("python3".into()),
            args: vec!["bridge.py".into()],
            working_dir: Some("/tmp".into()),
        };
        let bridge = BridgeCommand::from_config(&config).unwrap();
        assert_eq!(bridge.command, "python3");
        assert_eq!(bridge.working_dir, Some(PathBuf::from("/tmp")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn round_trips_through_a_real_process() {
        let script = r#"read line; echo '{"type":"analysis","analysis":{"ok":true}}'"#;
        let bridge = BridgeCommand::new("sh", vec!["-c".into(), script.into()]);
        let analysis = bridge.analyze("text", "title", None).await.unwrap();
        assert_eq!(analysis["ok"], true);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn bridge_error_becomes_mapping_error() {
        let script = r#"read line; echo '{"type":"error","error":"no model"}'"#;
        let bridge = BridgeCommand::new("sh", vec!["-c".into(), script.into()]);
        let err = bridge.map_titles(&[], &[]).await.unwrap_err();
        assert!(matches!(err, OutlineError::Mapping(ref m) if m == "no model"));
    }

    #[tokio::test]
    async fn missing_executable_is_bridge_error() {
        let bridge = BridgeCommand::new("definitely-not-a-real-bridge-binary", vec![]);
        let err = bridge.analyze("t", "t", None).await.unwrap_err();
        assert!(matches!(err, OutlineError::Bridge(_)));
    }
}
