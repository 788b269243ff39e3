use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::{Notify, mpsc};

use crate::agents::user_proxy::{END_OF_INPUT_REPLY, USER_PROXY_NAME};
use crate::agents::{
    AgentContext, AssistantAgent, ChatAgent, ScriptedInput, UserProxyAgent, canonical_agent_name,
    create_participant, parse_participant_spec, repository_parser, repository_team, task_organizer,
};
use crate::cli::*;
use crate::config::*;
use crate::docker::*;
use crate::error::*;
use crate::llm::{Llm, LlmRequest, LlmResponse, MockLlm, Role, ToolCall};
use crate::mcp::*;
use crate::memory::InteractionMemory;
use crate::messages::*;
use crate::orchestrator::*;
use crate::provider::*;
use crate::repo_id::*;
use crate::retrieval::*;
use crate::streaming::*;
use crate::team::{DEFAULT_MAX_SELECTOR_ATTEMPTS, SelectorGroupChat, Termination};
use crate::telemetry::*;
use crate::todos::*;
use crate::tools::*;

struct FixedReplyAgent {
    name: String,
    reply: String,
}

#[async_trait]
impl ChatAgent for FixedReplyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Replies with a fixed message."
    }

    async fn on_messages(&self, _history: &[TextMessage], _events: &EventSink) -> Result<Response> {
        Ok(Response::text(self.name.clone(), self.reply.clone()))
    }
}

fn fixed_agent(name: &str, reply: &str) -> Arc<dyn ChatAgent> {
    Arc::new(FixedReplyAgent {
        name: name.to_string(),
        reply: reply.to_string(),
    })
}

fn mock_model(responses: &[&str]) -> Arc<MockLlm> {
    Arc::new(MockLlm::with_responses(
        "mock",
        responses.iter().map(|r| LlmResponse::text(*r)).collect(),
    ))
}

fn echo_tool() -> FunctionTool {
    FunctionTool::new(
        "echo",
        "Echoes the given text.",
        string_arg_schema("text", "Text to echo"),
        |args| async move { Ok::<_, anyhow::Error>(format!("echo: {}", string_arg(&args, "text")?)) },
    )
}

fn echo_call(id: &str, text: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: "echo".to_string(),
        arguments: json!({ "text": text }),
    }
}

fn test_context(data_dir: &Path, model: Arc<MockLlm>) -> AgentContext {
    let paths = AppPaths {
        config_file: data_dir.join(CONFIG_FILE_NAME),
        data_dir: data_dir.to_path_buf(),
    };
    AgentContext::new(Arc::new(AppConfig::default()), paths).with_model_override(model)
}

fn sources(result: &TaskResult) -> Vec<&str> {
    result.messages.iter().map(|m| m.source.as_str()).collect()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<TeamEvent>) -> Vec<TeamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn default_config_lists_every_builtin_agent() {
    let cfg = default_config().expect("default config should build");
    let mut names = crate::defaults::list_available_defaults();
    names.sort();
    assert_eq!(cfg.agents.keys().map(String::as_str).collect::<Vec<_>>(), names);
    assert_eq!(
        cfg.agents["orchestrator"].participants,
        Some(vec!["repository_team[.]".to_string()])
    );
    validate_config(&cfg).expect("default config should validate");
}

#[test]
fn load_config_requires_file_and_accepts_empty_one() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("config.yaml");

    let err = load_config(&path).expect_err("missing config should fail");
    assert!(err.to_string().contains("config init"));
    assert_eq!(categorize_error(&err), ErrorCategory::Config);

    std::fs::write(&path, "   \n").expect("config should write");
    let cfg = load_config(&path).expect("empty config should load");
    assert!(cfg.agents.is_empty());
}

#[test]
fn load_config_rejects_unknown_keys() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "colour: red\n").expect("config should write");
    assert!(load_config(&path).is_err());
}

#[test]
fn load_config_accepts_component_model_dumps() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        r#"agents:
  git:
    model_provider:
      component_type: model
      component_version: null
      config:
        api_key: sk-or-test
        base_url: https://openrouter.ai/api/v1
        model: deepseek/deepseek-chat-v3-0324
        model_info:
          family: deepseek
          function_calling: true
          json_output: true
          vision: false
      description: null
      label: null
      provider: autogen_ext.models.openai.OpenAIChatCompletionClient
      version: null
    memory:
      is_cloud: false
      config:
        path: /tmp/mem0
    directory: /srv/repo
default_model_provider:
  component_type: model
  component_version: null
  config:
    api_key: <API_KEY>
    base_url: https://openrouter.ai/api/v1
    model: deepseek/deepseek-chat-v3-0324
    model_info:
      family: deepseek
      multiple_system_messages: true
  description: null
  label: null
  provider: autogen_ext.models.openai.OpenAIChatCompletionClient
  version: null
"#,
    )
    .expect("config should write");

    let cfg = load_config(&path).expect("component model dump should load");
    assert_eq!(cfg.default_model_provider.provider, ProviderKind::Openai);
    assert_eq!(cfg.default_model_provider.config.model, "deepseek/deepseek-chat-v3-0324");
    let git = &cfg.agents["git"];
    let provider = git.model_provider.as_ref().expect("git provider should load");
    assert_eq!(provider.config.api_key.as_deref(), Some("sk-or-test"));
    assert_eq!(git.memory, Some(MemorySettings::default()));

    let updated = set_config_value(&path, "agents.git.max_tool_iterations", "4")
        .expect("set should keep foreign keys loadable");
    assert_eq!(updated.agents["git"].max_tool_iterations, Some(4));
    let raw = std::fs::read_to_string(&path).expect("config should read");
    assert!(raw.contains("model_info"));
}

#[test]
fn create_default_config_respects_force() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("nested").join("config.yaml");
    assert!(create_default_config(&path, false).expect("init should succeed"));
    assert!(!create_default_config(&path, false).expect("second init should succeed"));
    assert!(create_default_config(&path, true).expect("forced init should succeed"));
    let cfg = load_config(&path).expect("written config should load");
    assert!(cfg.agents.contains_key("repository_team"));
}

#[test]
fn set_config_value_keeps_yaml_types() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("config.yaml");

    let cfg = set_config_value(&path, "agents.git.max_tool_iterations", "30")
        .expect("integer value should set");
    assert_eq!(cfg.agents["git"].max_tool_iterations, Some(30));

    let cfg = set_config_value(
        &path,
        "agents.orchestrator.participants",
        "[github, 'git[/work/app]']",
    )
    .expect("list value should set");
    assert_eq!(
        cfg.agents["orchestrator"].participants,
        Some(vec!["github".to_string(), "git[/work/app]".to_string()])
    );

    let reloaded = load_config(&path).expect("saved config should load");
    assert_eq!(reloaded.agents["git"].max_tool_iterations, Some(30));

    assert!(set_config_value(&path, "agents..git", "1").is_err());
    assert!(set_config_value(&path, "agents.git.max_turns", "0").is_err());
    let unchanged = load_config(&path).expect("config should still load");
    assert_eq!(unchanged.agents["git"].max_turns, None);
}

#[test]
fn agent_config_overlays_user_keys_on_builtin_defaults() {
    let mut cfg = AppConfig::default();
    cfg.agents.insert(
        "git".to_string(),
        AgentConfig {
            max_tool_iterations: Some(7),
            ..AgentConfig::default()
        },
    );

    cfg.agents.insert(
        "repository_team".to_string(),
        AgentConfig {
            allow_repeated_speaker: Some(false),
            ..AgentConfig::default()
        },
    );

    let git = agent_config(&cfg, "git").expect("git config should merge");
    assert_eq!(git.max_tool_iterations, Some(7));

    let team = agent_config(&cfg, "repository_team").expect("team config should merge");
    assert_eq!(team.allow_repeated_speaker, Some(false));
    assert_eq!(team.max_turns, Some(50));
    assert_eq!(team.termination_text.as_deref(), Some("TERMINATE"));

    let custom = agent_config(&cfg, "custom_orchestrator").expect("unknown section should be empty");
    assert_eq!(custom, AgentConfig::default());
    assert!(agent_config(&cfg, "  ").is_err());
}

#[test]
fn masked_config_hides_literal_secrets() {
    let mut cfg = AppConfig::default();
    cfg.default_model_provider.config.api_key = Some("sk-literal-key-9876".to_string());
    cfg.agents.insert(
        "github".to_string(),
        AgentConfig {
            github_token: Some("ghp_abcdefgh1234".to_string()),
            ..AgentConfig::default()
        },
    );

    let masked = masked_for_display(&cfg);
    assert_eq!(
        masked.default_model_provider.config.api_key.as_deref(),
        Some("****9876")
    );
    assert_eq!(masked.agents["github"].github_token.as_deref(), Some("****1234"));
    assert_eq!(mask_secret(API_KEY_PLACEHOLDER), API_KEY_PLACEHOLDER);
}

// ---------------------------------------------------------------------------
// providers and errors
// ---------------------------------------------------------------------------

fn openai_provider(api_key: Option<&str>, api_key_env: Option<&str>) -> ModelProviderConfig {
    ModelProviderConfig {
        provider: ProviderKind::Openai,
        config: ModelClientSettings {
            model: "gpt-4o".to_string(),
            api_key: api_key.map(str::to_string),
            api_key_env: api_key_env.map(str::to_string),
            ..ModelClientSettings::default()
        },
    }
}

#[test]
fn api_key_resolution_order() {
    let literal = openai_provider(Some("sk-literal"), Some("TEAM_OPENAI_KEY"));
    let key = resolve_api_key_with(&literal, |_| Some("from-env".to_string()))
        .expect("literal key should resolve");
    assert_eq!(key.as_deref(), Some("sk-literal"));

    let placeholder = openai_provider(Some(API_KEY_PLACEHOLDER), Some("TEAM_OPENAI_KEY"));
    let key = resolve_api_key_with(&placeholder, |name| {
        (name == "TEAM_OPENAI_KEY").then(|| "from-custom-env".to_string())
    })
    .expect("custom env key should resolve");
    assert_eq!(key.as_deref(), Some("from-custom-env"));

    let key = resolve_api_key_with(&placeholder, |name| {
        (name == "OPENAI_API_KEY").then(|| "from-conventional-env".to_string())
    })
    .expect("conventional env key should resolve");
    assert_eq!(key.as_deref(), Some("from-conventional-env"));

    let err = resolve_api_key_with(&placeholder, |_| None).expect_err("missing key should fail");
    let message = err.to_string();
    assert!(message.contains("TEAM_OPENAI_KEY"));
    assert!(message.contains("<API_KEY> placeholder"));
    assert_eq!(categorize_error(&err), ErrorCategory::Provider);
}

#[test]
fn ollama_needs_no_api_key() {
    let provider = ModelProviderConfig {
        provider: ProviderKind::Ollama,
        config: ModelClientSettings {
            model: "llama3".to_string(),
            ..ModelClientSettings::default()
        },
    };
    let key = resolve_api_key_with(&provider, |_| None).expect("ollama should not need a key");
    assert_eq!(key, None);
}

#[test]
fn model_names_are_checked_against_provider() {
    let mut provider = openai_provider(None, None);
    provider.config.model = "claude-sonnet".to_string();
    assert!(validate_model_for_provider(&provider).is_err());

    provider.config.base_url = Some("http://localhost:4000/v1".to_string());
    assert!(validate_model_for_provider(&provider).is_ok());

    provider.config.model = "   ".to_string();
    assert!(validate_model_for_provider(&provider).is_err());
}

#[test]
fn errors_are_categorized_and_redacted() {
    let cases = [
        ("docker daemon is not reachable", ErrorCategory::Container),
        ("unknown agent 'calendar' in participant 'calendar'", ErrorCategory::Input),
        ("tool 'read_file' failed", ErrorCategory::Tooling),
        ("something odd happened", ErrorCategory::Internal),
    ];
    for (message, expected) in cases {
        assert_eq!(categorize_error(&anyhow::anyhow!(message)), expected, "{message}");
    }

    let rendered = format_cli_error(&anyhow::anyhow!("request rejected for sk-abcdef123456"));
    assert!(rendered.starts_with("[INTERNAL]"));
    assert!(rendered.contains("[REDACTED]"));
    assert!(!rendered.contains("sk-abcdef123456"));
    assert!(rendered.contains("Hint:"));

    assert_eq!(
        redact_sensitive_text("header Authorization: Bearer abc.def-123 was rejected"),
        "header Authorization: Bearer [REDACTED] was rejected"
    );
    assert_eq!(
        redact_sensitive_text("sent \"authorization: bearer  tok3n\", retrying"),
        "sent \"authorization: bearer  [REDACTED]\", retrying"
    );
    assert_eq!(redact_sensitive_text("bearer"), "bearer");
}

// ---------------------------------------------------------------------------
// participants
// ---------------------------------------------------------------------------

#[test]
fn participant_specs_parse_names_and_params() {
    let spec = parse_participant_spec("git[ /work/app , extra ]").expect("spec should parse");
    assert_eq!(spec.name, "git");
    assert_eq!(spec.params, vec!["/work/app".to_string(), "extra".to_string()]);

    let spec = parse_participant_spec("github").expect("bare name should parse");
    assert!(spec.params.is_empty());

    for invalid in ["git[]", "git[/work", "[/work]", "git[a]b]", ""] {
        assert!(parse_participant_spec(invalid).is_err(), "{invalid}");
    }
}

#[test]
fn participant_aliases_resolve_to_builtin_agents() {
    assert_eq!(canonical_agent_name("repository_team.git"), Some("git"));
    assert_eq!(canonical_agent_name("parser"), Some("repository_parser"));
    assert_eq!(
        canonical_agent_name("repository_team.coding_specialist"),
        Some("coding_specialist")
    );
    assert_eq!(canonical_agent_name("interaction_memory"), Some("interaction_memory"));
    assert_eq!(canonical_agent_name("calendar"), None);
}

#[tokio::test]
async fn unknown_participants_are_rejected() {
    let dir = tempdir().expect("temp directory should create");
    let ctx = test_context(dir.path(), mock_model(&[]));

    let Err(err) = create_participant(&ctx, "calendar").await else {
        panic!("unknown participant should fail");
    };
    assert!(err.to_string().contains("Known agents: coding_specialist"));

    let missing = dir.path().join("missing");
    let spec = format!("git[{}]", missing.display());
    let Err(err) = create_participant(&ctx, &spec).await else {
        panic!("missing repository should fail");
    };
    assert!(err.to_string().contains("is not a directory"));
}

// ---------------------------------------------------------------------------
// selector group chat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn selector_picks_the_mentioned_speaker() {
    let model = mock_model(&["I think beta should answer."]);
    let team = SelectorGroupChat::new(
        "team",
        vec![fixed_agent("alpha", "from alpha"), fixed_agent("beta", "from beta")],
        model.clone(),
    )
    .expect("team should build")
    .with_termination(Termination::MaxMessages(2));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = team
        .run("say hello", &EventSink::new(tx))
        .await
        .expect("team should run");

    assert_eq!(sources(&result), vec!["user", "beta"]);
    assert_eq!(
        result.stop_reason.as_deref(),
        Some("Maximum number of messages 2 reached, current message count: 2")
    );

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&TeamEvent::Message(TextMessage::new("user", "say hello"))));
    assert!(events.contains(&TeamEvent::SelectSpeaker {
        team: "team".to_string(),
        speaker: "beta".to_string(),
    }));
    assert!(matches!(events.last(), Some(TeamEvent::TaskResult(_))));

    let prompt = &model.requests()[0].messages[0].content;
    assert!(prompt.contains("alpha: Replies with a fixed message."));
    assert!(prompt.contains("[alpha, beta]"));
    assert!(prompt.contains("user: say hello"));
}

#[tokio::test]
async fn selector_retries_with_feedback() {
    let model = mock_model(&["alpha or beta", "nobody", "beta"]);
    let team = SelectorGroupChat::new(
        "team",
        vec![fixed_agent("alpha", "a"), fixed_agent("beta", "b")],
        model.clone(),
    )
    .expect("team should build")
    .with_termination(Termination::MaxMessages(2));

    let result = team
        .run("task", &EventSink::discard())
        .await
        .expect("team should run");
    assert_eq!(sources(&result), vec!["user", "beta"]);

    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[1].role, Role::Assistant);
    assert!(requests[1].messages[2]
        .content
        .starts_with("Expected exactly one name to be mentioned."));
    assert_eq!(
        requests[2].messages[4].content,
        "No valid name was mentioned. Please select from: alpha, beta."
    );
}

#[tokio::test]
async fn selector_falls_back_after_failed_attempts() {
    let model = mock_model(&[]);
    let team = SelectorGroupChat::new(
        "team",
        vec![fixed_agent("alpha", "a"), fixed_agent("beta", "b")],
        model.clone(),
    )
    .expect("team should build")
    .with_max_turns(1);

    let result = team
        .run("task", &EventSink::discard())
        .await
        .expect("team should run");
    assert_eq!(sources(&result), vec!["user", "alpha"]);
    assert_eq!(result.stop_reason.as_deref(), Some("Maximum number of turns 1 reached."));
    assert_eq!(model.requests().len(), DEFAULT_MAX_SELECTOR_ATTEMPTS);
}

#[tokio::test]
async fn repeated_speaker_can_be_disallowed() {
    let model = Arc::new(MockLlm::new("mock").with_fallback("alpha"));
    let team = SelectorGroupChat::new(
        "team",
        vec![fixed_agent("alpha", "a"), fixed_agent("beta", "b")],
        model.clone(),
    )
    .expect("team should build")
    .with_allow_repeated_speaker(false)
    .with_max_turns(2);

    let result = team
        .run("task", &EventSink::discard())
        .await
        .expect("team should run");
    assert_eq!(sources(&result), vec!["user", "alpha", "beta"]);
    // The second turn has a single candidate, so the model is asked once.
    assert_eq!(model.requests().len(), 1);
}

#[test]
fn teams_reject_empty_or_duplicate_participants() {
    let model = mock_model(&[]);
    assert!(SelectorGroupChat::new("team", Vec::new(), model.clone()).is_err());
    assert!(SelectorGroupChat::new(
        "team",
        vec![fixed_agent("alpha", "a"), fixed_agent("alpha", "b")],
        model,
    )
    .is_err());
}

#[test]
fn termination_conditions_report_reasons() {
    let from_user = Termination::text_mention_from("BYE", &[USER_PROXY_NAME]);
    let other = vec![TeamEvent::Message(TextMessage::new("assistant", "BYE for now"))];
    assert_eq!(from_user.check(&other, 3), None);
    let proxy = vec![TeamEvent::Message(TextMessage::new(USER_PROXY_NAME, "BYE"))];
    assert_eq!(from_user.check(&proxy, 3).as_deref(), Some("Text 'BYE' mentioned"));

    let tool_output = vec![TeamEvent::ToolCallExecution {
        source: "task_organizer".to_string(),
        results: vec![ToolExecution {
            call_id: "c1".to_string(),
            name: "finalize_and_terminate".to_string(),
            content: "TERMINATE".to_string(),
            is_error: false,
        }],
    }];
    let combined = Termination::text_mention("TERMINATE").or(Termination::MaxMessages(10));
    assert_eq!(
        combined.check(&tool_output, 2).as_deref(),
        Some("Text 'TERMINATE' mentioned")
    );
    assert_eq!(
        combined.check(&[], 10).as_deref(),
        Some("Maximum number of messages 10 reached, current message count: 10")
    );
    assert_eq!(combined.check(&[], 9), None);
}

#[tokio::test]
async fn nested_team_passes_inner_events_to_outer_termination() {
    let inner = SelectorGroupChat::new(
        "repository_team_demo",
        vec![fixed_agent("worker", "All tasks done. TERMINATE")],
        mock_model(&[]),
    )
    .expect("inner team should build")
    .with_termination(Termination::text_mention("TERMINATE"));

    let outer_model = mock_model(&["repository_team_demo"]);
    let outer = SelectorGroupChat::new(
        "orchestrator",
        vec![Arc::new(inner) as Arc<dyn ChatAgent>, fixed_agent("beta", "b")],
        outer_model,
    )
    .expect("outer team should build")
    .with_termination(Termination::text_mention_from("TERMINATE", &["worker"]))
    .with_max_turns(5);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = outer
        .run("fix the bug", &EventSink::new(tx))
        .await
        .expect("outer team should run");

    assert_eq!(sources(&result), vec!["user", "repository_team_demo"]);
    assert_eq!(result.stop_reason.as_deref(), Some("Text 'TERMINATE' mentioned"));
    assert_eq!(
        result.last_message().map(|m| m.content.as_str()),
        Some("All tasks done. TERMINATE")
    );

    let events = drain(&mut rx);
    assert!(events.contains(&TeamEvent::SelectSpeaker {
        team: "repository_team_demo".to_string(),
        speaker: "worker".to_string(),
    }));
}

// ---------------------------------------------------------------------------
// assistant agent and tools
// ---------------------------------------------------------------------------

#[tokio::test]
async fn assistant_runs_tools_until_text_reply() {
    let model = Arc::new(MockLlm::with_responses(
        "mock",
        vec![
            LlmResponse::tool_calls(vec![echo_call("c1", "hi")]),
            LlmResponse::text("done"),
        ],
    ));
    let agent = AssistantAgent::new("helper", model.clone())
        .with_system_message("You help.")
        .with_workbench(Arc::new(StaticWorkbench::new(vec![echo_tool()])))
        .with_max_tool_iterations(2);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let response = agent
        .on_messages(&[TextMessage::new("user", "go")], &EventSink::new(tx))
        .await
        .expect("agent should answer");

    assert_eq!(response.message, TextMessage::new("helper", "done"));
    assert_eq!(response.inner_events.len(), 2);
    let TeamEvent::ToolCallExecution { results, .. } = &response.inner_events[1] else {
        panic!("second inner event should be a tool execution");
    };
    assert_eq!(results[0].content, "echo: hi");
    assert!(!results[0].is_error);
    assert_eq!(drain(&mut rx).len(), 2);

    let requests = model.requests();
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].messages[0].role, Role::System);
    assert_eq!(requests[0].messages[1].content, "user: go");
    let tool_message = requests[1]
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool result should be sent back to the model");
    assert_eq!(tool_message.content, "echo: hi");
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn assistant_summarizes_tools_after_default_single_iteration() {
    let model = Arc::new(MockLlm::with_responses(
        "mock",
        vec![LlmResponse::tool_calls(vec![
            echo_call("c1", "first"),
            ToolCall {
                id: "c2".to_string(),
                name: "missing".to_string(),
                arguments: json!({}),
            },
        ])],
    ));
    let agent = AssistantAgent::new("helper", model.clone())
        .with_workbench(Arc::new(StaticWorkbench::new(vec![echo_tool()])));
    assert_eq!(agent.max_tool_iterations(), 1);

    let response = agent
        .on_messages(&[TextMessage::new("user", "go")], &EventSink::discard())
        .await
        .expect("agent should answer");
    assert_eq!(
        response.message.content,
        "echo: first\ntool 'missing' not found. Available tools: echo"
    );
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn assistant_injects_recalled_memories() {
    let dir = tempdir().expect("temp directory should create");
    let memory = Arc::new(InteractionMemory::open(dir.path()).expect("memory should open"));
    memory
        .add(
            "Conversation summary:\nuser: rename the parser module".to_string(),
            BTreeMap::new(),
        )
        .expect("memory should store");

    let model = mock_model(&["noted"]);
    let agent = AssistantAgent::new("interaction_memory", model.clone()).with_memory(memory, 5);
    agent
        .on_messages(
            &[TextMessage::new("user", "continue the parser cleanup")],
            &EventSink::discard(),
        )
        .await
        .expect("agent should answer");

    let messages = &model.requests()[0].messages;
    assert_eq!(messages[1].role, Role::System);
    assert!(messages[1].content.contains("Relevant memory content"));
    assert!(messages[1].content.contains("rename the parser module"));
}

#[tokio::test]
async fn function_tool_errors_become_error_results() {
    let workbench = StaticWorkbench::new(vec![echo_tool()]);
    let result = workbench
        .call_tool("echo", json!({}))
        .await
        .expect("call should return a result");
    assert!(result.is_error);
    assert!(result.content.starts_with("Error: missing required string argument 'text'"));

    let result = workbench
        .call_tool("echo", json!("bare"))
        .await
        .expect("call should return a result");
    assert_eq!(result, ToolResult::ok("echo: bare"));
}

#[tokio::test]
async fn filtered_workbench_hides_and_blocks_denied_tools() {
    let dir = tempdir().expect("temp directory should create");
    let inner = Arc::new(task_organizer::todo_tools(TodoManager::new(dir.path())));
    let deny = vec!["list_*".to_string()];
    let filtered = FilteredWorkbench::wrap(inner, None, Some(&deny[..]));

    let names = filtered
        .list_tools()
        .await
        .expect("tools should list")
        .into_iter()
        .map(|t| t.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["add_todo", "mark_task_done", "finalize_and_terminate"]);

    let blocked = filtered
        .call_tool("list_todos", json!({}))
        .await
        .expect("call should return a result");
    assert!(blocked.is_error);
    assert_eq!(blocked.content, "tool 'list_todos' is not permitted for this agent");
}

#[tokio::test]
async fn user_proxy_trims_input_and_says_bye_at_end_of_input() {
    let proxy = UserProxyAgent::new(Arc::new(ScriptedInput::new(vec![
        "  ship it  ".to_string(),
    ])));
    let first = proxy
        .on_messages(&[], &EventSink::discard())
        .await
        .expect("proxy should read input");
    assert_eq!(first.message, TextMessage::new(USER_PROXY_NAME, "ship it"));

    let second = proxy
        .on_messages(&[], &EventSink::discard())
        .await
        .expect("proxy should handle end of input");
    assert_eq!(second.message.content, END_OF_INPUT_REPLY);
}

// ---------------------------------------------------------------------------
// TODO list
// ---------------------------------------------------------------------------

#[test]
fn todo_manager_messages() {
    let dir = tempdir().expect("temp directory should create");
    let todos = TodoManager::new(dir.path());

    assert_eq!(
        todos.list_todos(),
        "TODO list not found. It will be created when you add the first task."
    );
    assert_eq!(todos.mark_task_done(1), "TODO list not found.");
    assert_eq!(todos.add_todo("write tests"), "Successfully added task: 'write tests'");
    todos.add_todo("ship");

    let content = std::fs::read_to_string(dir.path().join(TODO_FILE_NAME))
        .expect("TODO file should exist");
    assert_eq!(content, "# AI-Managed TODO List\n\n- [ ] write tests\n- [ ] ship\n");
    assert_eq!(todos.list_todos(), content);

    assert_eq!(todos.mark_task_done(2), "Successfully marked task 2 as done.");
    assert_eq!(todos.mark_task_done(2), "Task 2 is already marked as done.");
    assert_eq!(
        todos.mark_task_done(5),
        "Error: Invalid task number 5. Please provide a number between 1 and 2."
    );
    assert_eq!(
        todos.mark_task_done(0),
        "Error: Invalid task number 0. Please provide a number between 1 and 2."
    );
    assert!(todos.list_todos().ends_with("- [ ] write tests\n- [x] ship\n"));

    assert_eq!(todos.delete_todo_file(), "TODO list file deleted successfully.");
    assert_eq!(
        todos.delete_todo_file(),
        "TODO list file not found, nothing to delete."
    );
}

#[test]
fn empty_todo_file_lists_as_empty() {
    let dir = tempdir().expect("temp directory should create");
    std::fs::write(dir.path().join(TODO_FILE_NAME), "\n").expect("file should write");
    assert_eq!(TodoManager::new(dir.path()).list_todos(), "TODO list is empty.");
}

#[tokio::test]
async fn todo_tools_accept_string_numbers_and_finalize() {
    let dir = tempdir().expect("temp directory should create");
    let manager = task_organizer::prepare_todo_list(dir.path());
    assert!(manager.list_todos().contains(task_organizer::INITIAL_TASK));

    let tools = task_organizer::todo_tools(manager.clone());
    let marked = tools
        .call_tool("mark_task_done", json!({ "task_number": "1" }))
        .await
        .expect("tool should run");
    assert_eq!(marked, ToolResult::ok("Successfully marked task 1 as done."));

    let invalid = tools
        .call_tool("mark_task_done", json!({ "task_number": "one" }))
        .await
        .expect("tool should run");
    assert!(invalid.is_error);

    let finished = tools
        .call_tool("finalize_and_terminate", json!({}))
        .await
        .expect("tool should run");
    assert_eq!(finished.content, "TERMINATE");
    assert!(!manager.path().exists());
}

// ---------------------------------------------------------------------------
// repository ids, indexing and search
// ---------------------------------------------------------------------------

#[test]
fn repository_ids_are_stable_and_persisted() {
    let dir = tempdir().expect("temp directory should create");
    let data = dir.path().join("data");
    let repo_a = dir.path().join("a");
    let repo_b = dir.path().join("b");
    std::fs::create_dir_all(&repo_a).expect("repo a should create");
    std::fs::create_dir_all(&repo_b).expect("repo b should create");

    let mut ids = RepositoryIdManager::open(&data).expect("id manager should open");
    let id_a = ids.get_repo_id(&repo_a).expect("id should assign");
    assert_eq!(id_a.len(), 12);
    assert!(id_a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(ids.get_repo_id(&repo_a).expect("id should repeat"), id_a);
    let id_b = ids.get_repo_id(&repo_b).expect("id should assign");
    assert_ne!(id_a, id_b);
    assert!(ids.data_dir(&id_a).is_dir());

    let reopened = RepositoryIdManager::open(&data).expect("id manager should reopen");
    let expected = absolute_path(&repo_a)
        .expect("path should resolve")
        .to_string_lossy()
        .into_owned();
    assert_eq!(reopened.lookup(&id_a), Some(expected.as_str()));
    assert!(data.join(MAPPING_FILE_NAME).exists());
}

#[test]
fn chunks_overlap_by_characters() {
    let chunks = split_into_chunks("abcdefghij", 4, 2);
    let texts = chunks.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>();
    assert_eq!(texts, vec!["abcd", "cdef", "efgh", "ghij"]);
    assert_eq!(chunks[3].0, ChunkLocation { start: 6, end: 10 });

    let wide = split_into_chunks("ééé", 2, 0);
    assert_eq!(wide.len(), 2);
    assert_eq!(wide[1].1, "é");

    assert!(split_into_chunks("   \n  ", 4, 0).is_empty());
}

#[test]
fn query_terms_drop_short_words_when_longer_ones_exist() {
    assert_eq!(query_terms("how to Parse, the CONFIG?"), vec!["how", "parse", "the", "config"]);
    assert_eq!(query_terms("a b"), vec!["a", "b"]);
    assert!(query_terms("  !? ").is_empty());
}

#[test]
fn indexing_respects_extensions_and_excluded_directories() {
    let repo = tempdir().expect("repo directory should create");
    let data = tempdir().expect("data directory should create");
    std::fs::create_dir_all(repo.path().join("src")).expect("src should create");
    std::fs::create_dir_all(repo.path().join("target")).expect("target should create");
    std::fs::write(
        repo.path().join("src").join("lib.rs"),
        "pub fn parse_config() -> Config {\n    Config::default()\n}\n",
    )
    .expect("lib.rs should write");
    std::fs::write(repo.path().join("README.md"), "# Demo\n\nHow to run the demo.\n")
        .expect("README should write");
    std::fs::write(repo.path().join("target").join("build.rs"), "fn parse_config() {}\n")
        .expect("target file should write");
    std::fs::write(repo.path().join("notes.txt"), "parse_config notes\n")
        .expect("notes should write");

    let indexer = RepositoryIndexer::new(repo.path(), data.path(), ParserConfig::default())
        .expect("indexer should build");
    let Err(err) = indexer.search("parse_config", 5) else {
        panic!("search before indexing should fail");
    };
    assert!(err.to_string().contains("no index yet"));

    let stats = indexer.index_repository().expect("repository should index");
    assert_eq!(stats.files, 2);
    assert!(indexer.index_path().exists());

    let results = indexer.search("parse_config", 5).expect("search should run");
    assert!(!results.is_empty());
    assert_eq!(results[0].filename, "src/lib.rs");
    assert!(results.iter().all(|r| r.filename != "target/build.rs"));

    let reloaded = RepositoryIndexer::new(repo.path(), data.path(), ParserConfig::default())
        .expect("indexer should rebuild");
    assert_eq!(reloaded.repo_id(), indexer.repo_id());
    let results = reloaded.search("demo", 5).expect("persisted index should load");
    assert_eq!(results[0].filename, "README.md");
}

#[test]
fn search_results_are_formatted_for_the_model() {
    assert_eq!(
        repository_parser::format_search_results("anything", &[]),
        "No results found for the query."
    );

    let result = SearchResult {
        filename: "src/lib.rs".to_string(),
        location: ChunkLocation { start: 0, end: 10 },
        text: "x".repeat(300),
        score: 0.5,
    };
    let text = repository_parser::format_search_results("parser", &[result]);
    assert!(text.starts_with("Found 1 results for 'parser':\n\n1. File: src/lib.rs\n   Score: 0.500\n"));
    assert!(text.contains(&format!("   Content: {}...\n\n", "x".repeat(200))));
}

// ---------------------------------------------------------------------------
// containers and MCP servers
// ---------------------------------------------------------------------------

#[test]
fn repository_server_commands_mount_the_repository() {
    let docker = DockerCli::new("docker");
    let params = filesystem_server_params(&docker, Path::new("/work/app"), "abc123def456");
    assert_eq!(params.command, "docker");
    assert_eq!(
        &params.args[..5],
        ["run", "-i", "--rm", "--name", "robotsix_fs_abc123def456"]
    );
    assert!(params.args.contains(&"robotsix-agents.repo=abc123def456".to_string()));
    assert!(params
        .args
        .contains(&"type=bind,src=/work/app,dst=/projects/app".to_string()));
    assert_eq!(&params.args[params.args.len() - 2..], ["mcp/filesystem", "/projects"]);
    assert_eq!(params.container_name.as_deref(), Some("robotsix_fs_abc123def456"));

    let git = git_server_params(&docker, Path::new("/work/app"), "abc123def456");
    assert_eq!(git.args.last().map(String::as_str), Some(GIT_IMAGE));
    assert_eq!(
        git.container_name,
        Some(container_name(ContainerKind::Git, "abc123def456"))
    );
    assert_eq!(mount_target(Path::new("/")), "/projects/repository");
}

#[test]
fn github_server_receives_token_through_env() {
    let params = github_server_params(&DockerCli::new("podman"), "ghp_secret_value".to_string());
    assert_eq!(params.command, "podman");
    assert_eq!(
        params.env.get(GITHUB_TOKEN_ENV).map(String::as_str),
        Some("ghp_secret_value")
    );
    assert_eq!(params.read_timeout_secs, GITHUB_READ_TIMEOUT_SECS);
    assert_eq!(params.container_name, None);
    let shown = params.display();
    assert!(shown.contains("GITHUB_PERSONAL_ACCESS_TOKEN=****"));
    assert!(!shown.contains("ghp_secret_value"));
}

#[test]
fn github_token_resolution_order() {
    let token = resolve_github_token_with(Some("configured"), |_| Some("env".to_string()))
        .expect("configured token should win");
    assert_eq!(token, "configured");

    let token = resolve_github_token_with(Some("  "), |name| {
        (name == "GITHUB_TOKEN").then(|| " fallback ".to_string())
    })
    .expect("fallback token should resolve");
    assert_eq!(token, "fallback");

    let err = resolve_github_token_with(None, |_| None).expect_err("missing token should fail");
    assert!(err.to_string().contains("GITHUB_PERSONAL_ACCESS_TOKEN"));
}

#[test]
fn container_listing_parses_tab_separated_rows() {
    let listing = "robotsix_fs_abc\tUp 2 minutes\tmcp/filesystem\n\nrobotsix_git_abc\tExited (0) 1 hour ago\tmcp/git\n";
    let containers = parse_container_listing(listing);
    assert_eq!(containers.len(), 2);
    assert_eq!(
        containers[1],
        ManagedContainer {
            name: "robotsix_git_abc".to_string(),
            status: "Exited (0) 1 hour ago".to_string(),
            image: "mcp/git".to_string(),
        }
    );
}

/// Stand-in `docker` that logs its arguments and knows one exited container.
#[cfg(unix)]
fn fake_docker(dir: &Path) -> (DockerCli, std::path::PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.join("docker.log");
    let script = dir.join("docker");
    std::fs::write(
        &script,
        format!(
            r#"#!/bin/sh
echo "$*" >> "{log}"
case "$1" in
  inspect)
    if [ "$4" = "robotsix_fs_stale" ]; then echo exited; exit 0; fi
    echo "Error: No such object: $4" >&2
    exit 1
    ;;
  rm) exit 0 ;;
  ps) printf 'robotsix_fs_stale\tExited (0) 5 minutes ago\tmcp/filesystem\n' ;;
  *) exit 2 ;;
esac
"#,
            log = log.display()
        ),
    )
    .expect("fake docker should write");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .expect("fake docker should be executable");
    (DockerCli::new(script.display().to_string()), log)
}

#[cfg(unix)]
#[tokio::test]
async fn stale_containers_are_removed_and_managed_ones_listed() {
    let dir = tempdir().expect("temp directory should create");
    let (docker, log) = fake_docker(dir.path());

    assert!(docker
        .remove_if_present("robotsix_fs_stale")
        .await
        .expect("stale container should be removed"));
    assert!(!docker
        .remove_if_present("robotsix_git_fresh")
        .await
        .expect("missing container is not an error"));

    let containers = docker.list_managed().await.expect("listing should succeed");
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].name, "robotsix_fs_stale");
    assert_eq!(containers[0].image, FILESYSTEM_IMAGE);

    let calls = std::fs::read_to_string(&log).expect("docker log should read");
    let calls = calls.lines().collect::<Vec<_>>();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0], "inspect --format {{.State.Status}} robotsix_fs_stale");
    assert_eq!(calls[1], "rm -f robotsix_fs_stale");
    assert_eq!(calls[2], "inspect --format {{.State.Status}} robotsix_git_fresh");
    assert!(calls[3].starts_with(&format!("ps -a --filter label={MANAGED_LABEL}")));
}

#[test]
fn mcp_payloads_convert_to_tool_specs_and_results() {
    let spec = tool_spec_from_value(&json!({
        "name": "read_file",
        "inputSchema": { "type": "object", "properties": { "path": { "type": "string" } } }
    }))
    .expect("tool spec should parse");
    assert_eq!(spec.name, "read_file");
    assert_eq!(spec.description, "");
    assert!(spec.parameters["properties"]["path"].is_object());
    assert!(tool_spec_from_value(&json!({ "description": "no name" })).is_none());

    let result = tool_result_from_value(&json!({
        "content": [
            { "type": "text", "text": "line one" },
            { "type": "text", "text": "line two" }
        ],
        "isError": true
    }));
    assert_eq!(result, ToolResult::error("line one\nline two"));

    let structured = tool_result_from_value(&json!({
        "content": [],
        "structuredContent": { "branch": "main" }
    }));
    assert_eq!(structured.content, r#"{"branch":"main"}"#);
    assert!(!structured.is_error);
}

// ---------------------------------------------------------------------------
// orchestrator
// ---------------------------------------------------------------------------

#[test]
fn orchestrator_config_comes_from_agent_section() {
    let defaults = agent_config(&AppConfig::default(), "orchestrator").expect("config should merge");
    let config = OrchestratorConfig::from_agent_config(&defaults).expect("config should build");
    assert_eq!(config.name, DEFAULT_ORCHESTRATOR_NAME);
    assert_eq!(config.max_turns, Some(50));
    assert_eq!(config.participants, vec!["repository_team[.]".to_string()]);
    assert!(!config.enable_user_proxy);
    assert_eq!(config.termination(), Termination::text_mention(TERMINATE_TEXT));

    let interactive = OrchestratorConfig {
        enable_user_proxy: true,
        ..config
    };
    assert_eq!(
        interactive.termination(),
        Termination::text_mention_from(END_OF_INPUT_REPLY, &[USER_PROXY_NAME])
    );

    let empty = AgentConfig {
        participants: Some(Vec::new()),
        ..AgentConfig::default()
    };
    assert!(OrchestratorConfig::from_agent_config(&empty).is_err());
}

#[tokio::test]
async fn interactive_orchestrator_stops_on_bye_and_saves_memory() {
    let dir = tempdir().expect("temp directory should create");
    let model = mock_model(&["user_proxy"]);
    let ctx = test_context(dir.path(), model);
    let config = OrchestratorConfig {
        name: "orchestrator".to_string(),
        description: "test orchestrator".to_string(),
        max_turns: Some(5),
        participants: vec!["interaction_memory".to_string()],
        enable_user_proxy: true,
        allow_repeated_speaker: true,
        selector_prompt: None,
    };
    let orchestrator = Orchestrator::new(config, "orchestrator", ctx)
        .with_input(Arc::new(ScriptedInput::new(Vec::new())));

    let result = orchestrator
        .run("hello", &EventSink::discard())
        .await
        .expect("orchestrator should run");
    assert_eq!(sources(&result), vec!["user", USER_PROXY_NAME]);
    assert_eq!(result.stop_reason.as_deref(), Some("Text 'BYE' mentioned"));

    let memory = InteractionMemory::open(dir.path()).expect("memory should reopen");
    assert_eq!(memory.len(), 1);
    let saved = memory.query("hello", 5);
    assert_eq!(saved[0].content, "Conversation summary:\nuser: hello\nuser_proxy: BYE");
    assert_eq!(
        saved[0].metadata.get("stop_reason").map(String::as_str),
        Some("Text 'BYE' mentioned")
    );
}

#[test]
fn conversation_summaries() {
    let result = TaskResult {
        messages: vec![
            TextMessage::new("user", "fix it"),
            TextMessage::new("repository_team_app", "done TERMINATE"),
        ],
        stop_reason: Some("Text 'TERMINATE' mentioned".to_string()),
    };
    assert_eq!(
        conversation_summary(&result).as_deref(),
        Some("Conversation summary:\nuser: fix it\nrepository_team_app: done TERMINATE")
    );

    let dir = tempdir().expect("temp directory should create");
    let memory = InteractionMemory::open(dir.path()).expect("memory should open");
    let empty = TaskResult {
        messages: Vec::new(),
        stop_reason: None,
    };
    assert!(!save_conversation(&memory, &empty).expect("empty save should succeed"));
    assert!(save_conversation(&memory, &result).expect("save should succeed"));
    assert_eq!(memory.len(), 1);
}

/// Model whose calls never complete; signals `started` on the first call.
struct StalledLlm {
    started: Arc<Notify>,
}

#[async_trait]
impl Llm for StalledLlm {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
        self.started.notify_one();
        std::future::pending().await
    }
}

#[tokio::test]
async fn interrupted_team_streams_its_stop_reason() {
    let started = Arc::new(Notify::new());
    let model = Arc::new(StalledLlm {
        started: Arc::clone(&started),
    });
    let team = SelectorGroupChat::new(
        "repository_team_app",
        vec![fixed_agent("alpha", "a"), fixed_agent("beta", "b")],
        model,
    )
    .expect("team should build");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = team
        .run_until("work", &EventSink::new(tx), async move { started.notified().await })
        .await
        .expect("interrupted run should return a result");

    assert_eq!(result.stop_reason.as_deref(), Some(INTERRUPTED_STOP_REASON));
    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(TeamEvent::Message(m)) if m.content == "work"));
    let Some(TeamEvent::TaskResult(streamed)) = events.last() else {
        panic!("the interrupted result should be the last streamed event");
    };
    assert_eq!(streamed, &result);
    assert_eq!(
        render_event(events.last().expect("events should not be empty")).last().map(String::as_str),
        Some("🛑 Stop reason: User interruption")
    );
}

#[tokio::test]
async fn interrupt_stops_a_running_team_without_saving_memory() {
    let dir = tempdir().expect("temp directory should create");
    let started = Arc::new(Notify::new());
    let paths = AppPaths {
        config_file: dir.path().join(CONFIG_FILE_NAME),
        data_dir: dir.path().to_path_buf(),
    };
    let ctx = AgentContext::new(Arc::new(AppConfig::default()), paths).with_model_override(
        Arc::new(StalledLlm {
            started: Arc::clone(&started),
        }),
    );
    let config = OrchestratorConfig {
        name: "orchestrator".to_string(),
        description: "test orchestrator".to_string(),
        max_turns: Some(5),
        participants: vec!["interaction_memory".to_string()],
        enable_user_proxy: true,
        allow_repeated_speaker: true,
        selector_prompt: None,
    };
    let orchestrator = Orchestrator::new(config, "orchestrator", ctx)
        .with_input(Arc::new(ScriptedInput::new(Vec::new())));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let interrupt = {
        let started = Arc::clone(&started);
        async move { started.notified().await }
    };
    let result = orchestrator
        .run_until("hello", &EventSink::new(tx), interrupt)
        .await
        .expect("interrupted run should still return a result");

    assert!(is_interrupted(&result));
    assert_eq!(result, interrupted_result());
    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(TeamEvent::TaskResult(r)) if is_interrupted(r)));

    let memory = InteractionMemory::open(dir.path()).expect("memory should reopen");
    assert_eq!(memory.len(), 0);
}

#[test]
fn interrupted_result_is_marked() {
    let result = interrupted_result();
    assert_eq!(result.stop_reason.as_deref(), Some(INTERRUPTED_STOP_REASON));
    assert_eq!(
        result.last_message(),
        Some(&TextMessage::new("system", "Task was interrupted by user."))
    );
    assert_eq!(final_text(&result), "Task was interrupted by user.");
}

#[tokio::test]
async fn repository_team_has_the_four_specialists() {
    let dir = tempdir().expect("temp directory should create");
    let repo = dir.path().join("demo");
    std::fs::create_dir_all(&repo).expect("repo should create");
    let ctx = test_context(&dir.path().join("data"), mock_model(&[]));

    let team = repository_team::build_team(&ctx, &repo)
        .await
        .expect("team should build");
    assert_eq!(team.name(), "repository_team_demo");
    assert_eq!(
        team.participant_names(),
        vec!["task_organizer", "coding_specialist", "git_assistant", "repository_parser"]
    );
    assert!(team.description().contains(&repo.display().to_string()));

    let todo = std::fs::read_to_string(repo.join(TODO_FILE_NAME)).expect("TODO list should be seeded");
    assert!(todo.contains(task_organizer::INITIAL_TASK));
}

// ---------------------------------------------------------------------------
// telemetry, streaming and cli
// ---------------------------------------------------------------------------

#[test]
fn team_events_are_recorded_and_summarized() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("telemetry").join("events.jsonl");
    let telemetry = TelemetrySink::with_path(true, path.clone(), "orchestrate");

    let events = [
        TeamEvent::SelectSpeaker {
            team: "orchestrator".to_string(),
            speaker: "alpha".to_string(),
        },
        TeamEvent::ToolCallRequest {
            source: "alpha".to_string(),
            calls: vec![echo_call("c1", "hi")],
        },
        TeamEvent::ToolCallExecution {
            source: "alpha".to_string(),
            results: vec![ToolExecution {
                call_id: "c1".to_string(),
                name: "echo".to_string(),
                content: "Error: boom".to_string(),
                is_error: true,
            }],
        },
        TeamEvent::TaskResult(interrupted_result()),
    ];
    for event in &events {
        emit_event_telemetry(event, &telemetry);
    }
    telemetry.emit("command.completed", json!({}));

    let lines = std::fs::read_to_string(&path)
        .expect("telemetry file should exist")
        .lines()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let records = lines
        .iter()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("line should be JSON"))
        .collect::<Vec<_>>();
    assert_eq!(records[0]["event"], "speaker.selected");
    assert_eq!(records[0]["team"], "orchestrator");
    assert_eq!(records[0]["agent"], "alpha");
    assert_eq!(records[2]["tool"], "echo");
    assert_eq!(records[2]["agent"], "alpha");
    assert!(records[2].get("team").is_none());
    assert!(records[4].get("agent").is_none());
    assert_eq!(records[4]["run_id"], telemetry.run_id.as_str());

    let summary = summarize_telemetry_lines(lines, 100);
    assert_eq!(summary.parsed_events, 5);
    assert_eq!(summary.tool_requested, 1);
    assert_eq!(summary.tool_failed, 1);
    assert_eq!(summary.team_completed, 1);
    assert_eq!(summary.command_completed, 1);
    assert_eq!(summary.speaker_counts.get("alpha"), Some(&1));
    assert_eq!(summary.command_counts.get("orchestrate"), Some(&5));
    assert_eq!(summary.unique_runs.len(), 1);
}

#[test]
fn disabled_telemetry_writes_nothing() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("events.jsonl");
    TelemetrySink::with_path(false, path.clone(), "team").emit("command.started", json!({}));
    assert!(!path.exists());

    let summary = summarize_telemetry_lines(vec!["not json".to_string(), String::new()], 10);
    assert_eq!(summary.parse_errors, 1);
    assert_eq!(summary.parsed_events, 0);
}

#[test]
fn events_render_as_console_lines() {
    assert_eq!(truncate_chars("abcdef", 3), "abc...");
    assert_eq!(truncate_chars("abc", 3), "abc");

    let select = TeamEvent::SelectSpeaker {
        team: "orchestrator".to_string(),
        speaker: "git".to_string(),
    };
    assert_eq!(render_event(&select), vec!["🤖 Agent selected: git"]);

    let request = TeamEvent::ToolCallRequest {
        source: "git".to_string(),
        calls: vec![
            ToolCall {
                id: "c1".to_string(),
                name: "git_status".to_string(),
                arguments: json!({}),
            },
            echo_call("c2", &"y".repeat(400)),
        ],
    };
    let lines = render_event(&request);
    assert_eq!(lines[0], "🔨 git: Tool request");
    assert_eq!(lines[1], "   Tool 1: git_status");
    assert_eq!(lines[2], "   Tool 2: echo");
    assert!(lines[3].starts_with("   Arguments: {\"text\":\"yyy"));
    assert!(lines[3].ends_with("..."));
    assert_eq!(lines.len(), 4);

    let done = render_event(&TeamEvent::TaskResult(TaskResult {
        messages: Vec::new(),
        stop_reason: Some("Text 'TERMINATE' mentioned".to_string()),
    }));
    assert_eq!(
        done,
        vec![
            RULE.to_string(),
            "✅ Task completed!".to_string(),
            "🛑 Stop reason: Text 'TERMINATE' mentioned".to_string(),
        ]
    );
    let interrupted = render_event(&TeamEvent::TaskResult(interrupted_result()));
    assert_eq!(interrupted[1], "⚠️ Task interrupted by user.");
}

#[tokio::test]
async fn consumed_events_yield_the_final_result() {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);
    sink.emit(TeamEvent::Message(TextMessage::new("user", "task")));
    sink.emit(TeamEvent::TaskResult(interrupted_result()));
    drop(sink);

    let result = consume_events(rx, TelemetrySink::disabled(), false).await;
    assert_eq!(result, Some(interrupted_result()));
}

#[test]
fn cli_parses_orchestrate_and_labels_commands() {
    let cli = Cli::try_parse_from(["robotsix-agents", "orchestrate", "--task", "fix it"])
        .expect("orchestrate should parse");
    let Commands::Orchestrate {
        agent_name,
        task,
        interactive,
    } = &cli.command
    else {
        panic!("expected orchestrate command");
    };
    assert_eq!(agent_name, "orchestrator");
    assert_eq!(task.as_deref(), Some("fix it"));
    assert!(!orchestrate_is_interactive(task.as_deref(), *interactive));
    assert!(orchestrate_is_interactive(None, false));
    assert!(orchestrate_is_interactive(Some("  "), false));

    assert!(Cli::try_parse_from([
        "robotsix-agents",
        "orchestrate",
        "--task",
        "x",
        "--interactive"
    ])
    .is_err());

    let cli = Cli::try_parse_from(["robotsix-agents", "repo", "search", ".", "config", "loading"])
        .expect("repo search should parse");
    assert_eq!(command_label(&cli.command), "repo.search");
    let Commands::Repo {
        command: RepoCommands::Search { query, limit, .. },
    } = cli.command
    else {
        panic!("expected repo search command");
    };
    assert_eq!(query, vec!["config", "loading"]);
    assert_eq!(limit, None);

    assert_eq!(LogLevel::Debug.as_filter(), "debug");
}
