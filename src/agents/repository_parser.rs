use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::{AgentContext, BuiltinProfile, ChatAgent, configured_assistant};
use crate::retrieval::{RepositoryIndexer, SearchResult};
use crate::tools::{FilteredWorkbench, FunctionTool, StaticWorkbench, string_arg, string_arg_schema};

pub const AGENT_NAME: &str = "repository_parser";
pub const CONFIG_KEY: &str = "repository_parser";
const PREVIEW_CHARS: usize = 200;

pub fn format_search_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found for the query.".to_string();
    }
    let mut out = format!("Found {} results for '{}':\n\n", results.len(), query);
    for (idx, result) in results.iter().enumerate() {
        let preview = result.text.chars().take(PREVIEW_CHARS).collect::<String>();
        out.push_str(&format!("{}. File: {}\n", idx + 1, result.filename));
        out.push_str(&format!("   Score: {:.3}\n", result.score));
        out.push_str(&format!("   Content: {preview}...\n\n"));
    }
    out
}

pub fn search_tools(indexer: RepositoryIndexer, max_results: usize) -> StaticWorkbench {
    let search = FunctionTool::new(
        "search_repository",
        "Searches the indexed repository content and returns the best matching file chunks.",
        string_arg_schema("query", "What to look for in the repository"),
        move |args| {
            let indexer = indexer.clone();
            async move {
                let query = string_arg(&args, "query")?;
                let lookup = query.clone();
                let searched =
                    tokio::task::spawn_blocking(move || indexer.search(&lookup, max_results)).await;
                let rendered = match searched {
                    Ok(Ok(results)) => format_search_results(&query, &results),
                    Ok(Err(err)) => {
                        tracing::error!(error = %err, "repository search failed");
                        format!("Error searching repository: {err:#}")
                    }
                    Err(err) => format!("Error searching repository: {err}"),
                };
                Ok::<_, anyhow::Error>(rendered)
            }
        },
    );
    StaticWorkbench::new(vec![search])
}

pub async fn create_agent(ctx: &AgentContext, repo_dir: &Path) -> Result<Arc<dyn ChatAgent>> {
    let cfg = ctx.agent_config(CONFIG_KEY)?;
    let model = ctx.model_for(CONFIG_KEY)?;
    let parser = cfg.parser.clone().unwrap_or_default();
    let max_results = parser.max_results.max(1);
    let indexer = RepositoryIndexer::new(repo_dir, &ctx.paths.data_dir, parser)?;

    tracing::info!(directory = %repo_dir.display(), "indexing repository");
    let to_index = indexer.clone();
    match tokio::task::spawn_blocking(move || to_index.index_repository()).await {
        Ok(Ok(stats)) => tracing::info!(
            repo_id = %stats.repo_id,
            files = stats.files,
            chunks = stats.chunks,
            "repository indexing completed"
        ),
        Ok(Err(err)) => tracing::error!(error = %err, "automatic repository indexing failed"),
        Err(err) => tracing::error!(error = %err, "repository indexing task panicked"),
    }

    let workbench = FilteredWorkbench::wrap(
        Arc::new(search_tools(indexer, max_results)),
        cfg.allow_tools.as_deref(),
        cfg.deny_tools.as_deref(),
    );

    let builtin = BuiltinProfile {
        system_message: "You search the repository for context relevant to the current task and \
                         summarise what you find so the team understands the codebase. You do \
                         not solve tasks yourself; you give the other agents the context they \
                         need. Use `search_repository` with focused queries."
            .to_string(),
        description: format!(
            "A Repository Parser that searches an index of the repository content, built \
             automatically on startup. Working on repository: {}",
            repo_dir.display()
        ),
        max_tool_iterations: 50,
    };

    let agent = configured_assistant(AGENT_NAME, model, &cfg, Some(repo_dir), builtin)
        .with_workbench(workbench);
    tracing::info!(agent = AGENT_NAME, directory = %repo_dir.display(), "created repository parser agent");
    Ok(Arc::new(agent))
}
