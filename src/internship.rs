//! The internship-list workflow: one agent reads the postings README on
//! GitHub, a second reconciles them into the Google Doc.

use anyhow::Result;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{Crew, CrewOutput, ExecutorConfig};
use crate::mcp::{EndpointConnector, ToolAdapter, ToolSet};
use crate::providers::LLMProvider;
use crate::types::{AgentSpec, KnowledgeText, Process, TaskSpec};

pub const DEFAULT_REPOSITORY: &str = "vanshb03/Summer2026-Internships";
pub const DEFAULT_DOCUMENT: &str = "Summer 2026 Internship List";
pub const DEFAULT_SUMMARY_FILE: &str = "changes_to_internship_doc.md";

pub const GITHUB_ENDPOINT: &str = "github";
pub const GOOGLE_ENDPOINT: &str = "google";

const HIGHLIGHTING_RULES: &str = r#"
The text can be highlighted in a few different ways:
* no highlighting - means that the internship application isn't open or there is no info currently about this internship application
* yellow - means that the internship application is open and it is either in-progress or hasn't been started yet
* green - means that the internship application has been submitted
* red - means that the internship rejected the application

ONLY THE USER IS ALLOWED TO HIGHLIGHT IN GREEN OR RED, YOU CAN ONLY USE YELLOW!

Here's a simple example of the structure you should aim for when working in the google doc:
Banks:
    1. company1 : url_for_company1_application
Quant Trading/Asset Managers/Hedge Funds:
    2. company2
        * role1_at_company2 : url_for_role1_at_company2_application
        * role2_at_company2 : url_for_role2_at_company2_application
Other Firms:
"#;

const RECONCILE_INSTRUCTIONS: &str = r#"
SPECIFIC ACTIONS TO TAKE IN THE GOOGLE DOC:

1. An internship opportunity is on the Github but not in the google doc:
   - Determine which category it falls under: Banks, Quant Trading/Asset Managers/Hedge Funds, or Other Firms
   - Add the company name for the opportunity at the end of the numbered list for that category
   - Highlight the company name in yellow which means the internship is open but the application hasn't been started or hasn't been finished
   - Add the link to that application next to the company name if the link is available
2. An internship opportunity is on the Github and in the google doc but the company name in the google doc isn't highlighted:
   - highlight the company name in yellow which means the internship application is open but the application hasn't been started or hasn't been finished
   - add the link to that application next to the company name if the link is available
3. An internship opportunity is not in the Github but it is in the google doc:
   - Don't change anything for that company name in the google doc, just leave it as is
4. An internship opportunity is already highlighted yellow, green, or red in the google doc:
   - Don't modify that internship opportunity in the google doc unless there's a link for that opportunity in the Github that hasn't been added to the google doc. In that case, just add the link to that opportunity in the google doc.
5. A special case where a company in the Github has more than one role open:
   - Follow the appropriate scenario from 1 - 4 but with a slight change
   - Under that company name in the google doc add all of the new roles for that company and the corresponding application links for each role.

After making all necessary updates to the Google Doc, provide a summary report of your actions."#;

const SUMMARY_EXPECTATIONS: &str = r#"A summary report containing:
• List of companies/roles added to the Google Doc
• List of companies/roles that were highlighted in yellow
• List of application links that were added
• Any uncertainties or issues encountered during the update process"#;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// `owner/name` of the repository whose README lists the postings
    pub repository: String,
    pub document_title: String,
    pub output_file: PathBuf,
    pub max_iterations: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            repository: DEFAULT_REPOSITORY.to_string(),
            document_title: DEFAULT_DOCUMENT.to_string(),
            output_file: PathBuf::from(DEFAULT_SUMMARY_FILE),
            max_iterations: ExecutorConfig::default().max_iterations,
        }
    }
}

pub fn highlighting_knowledge() -> KnowledgeText {
    KnowledgeText::new("internship highlighting rules", HIGHLIGHTING_RULES)
}

pub fn github_agent(tools: ToolSet, model: &str) -> AgentSpec {
    AgentSpec::new(
        "Expert Git User",
        "You are an expert git and github user. You are great at reading \
         README files and understanding them.",
        "With over 10 years of experience in git and github \
         you excel at reading README files.",
        tools,
        model,
    )
    .verbose(true)
    .allow_delegation(false)
}

pub fn github_task(agent: &AgentSpec, options: &SyncOptions) -> TaskSpec {
    let (owner, name) = options
        .repository
        .split_once('/')
        .unwrap_or(("", options.repository.as_str()));

    let description = if owner.is_empty() {
        format!("Go to the {} repository and read the README", name)
    } else {
        format!(
            "Go to the {} repository hosted by {} and read the README",
            name, owner
        )
    };

    TaskSpec::new(
        description,
        "A list of all the companies offering internships with the open roles \
         for each company and the links to every application",
        agent,
    )
}

pub fn google_agent(tools: ToolSet, model: &str) -> AgentSpec {
    AgentSpec::new(
        "Expert Google User",
        "You are an expert google docs and google drive user. \
         You are great at creating, editing, and reading google docs.",
        "With over 10 years of experience in google docs and google drive, \
         you excel at making google docs in google drive.",
        tools,
        model,
    )
    .with_knowledge(highlighting_knowledge())
    .verbose(true)
    .allow_delegation(false)
}

pub fn google_task(agent: &AgentSpec, options: &SyncOptions) -> TaskSpec {
    let description = format!(
        "MAIN OBJECTIVE: Update the '{}' Google Doc by comparing it with the GitHub README internship list.\n{}",
        options.document_title, RECONCILE_INSTRUCTIONS
    );

    TaskSpec::new(description, SUMMARY_EXPECTATIONS, agent).with_output_file(&options.output_file)
}

/// Assembles both agents and tasks. The GitHub task always runs first.
pub fn build_crew(
    config: &Config,
    options: &SyncOptions,
    github_tools: ToolSet,
    google_tools: ToolSet,
) -> Result<Crew> {
    let github = github_agent(github_tools, &config.model_name);
    let read_readme = github_task(&github, options);

    let google = google_agent(google_tools, &config.model_name);
    let reconcile = google_task(&google, options);

    let crew = Crew::new(
        vec![github, google],
        vec![read_readme, reconcile],
        Process::Sequential,
    )?
    .verbose(true)
    .with_executor_config(ExecutorConfig {
        max_iterations: options.max_iterations,
    });

    Ok(crew)
}

/// Connects to the GitHub endpoint, then the Google endpoint inside it, and
/// runs `body` with both tool sets. Both connections are closed in reverse
/// order however `body` ends.
pub async fn with_endpoints<F, Fut, T>(
    config: &Config,
    connector: &dyn EndpointConnector,
    body: F,
) -> Result<T>
where
    F: FnOnce(ToolSet, ToolSet) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let github_params = config.github_server_params();
    let github = ToolAdapter::connect(connector, GITHUB_ENDPOINT, &github_params).await?;

    github
        .scoped(|github_tools| async move {
            let google_params = config.google_server_params();
            let google = ToolAdapter::connect(connector, GOOGLE_ENDPOINT, &google_params).await?;

            google
                .scoped(|google_tools| async move {
                    println!(
                        "Available tools from Streamable HTTP MCP server: {:?}",
                        github_tools.names()
                    );
                    println!(
                        "Available tools from Local MCP server: {:?}",
                        google_tools.names()
                    );
                    body(github_tools, google_tools).await
                })
                .await
        })
        .await
}

pub async fn run(
    config: &Config,
    options: &SyncOptions,
    connector: &dyn EndpointConnector,
    llm_provider: Arc<dyn LLMProvider>,
) -> Result<CrewOutput> {
    with_endpoints(config, connector, |github_tools, google_tools| async move {
        let crew = build_crew(config, options, github_tools, google_tools)?;
        crew.kickoff(llm_provider).await
    })
    .await
}

/// Tool names of each endpoint, GitHub first.
pub async fn discover(
    config: &Config,
    connector: &dyn EndpointConnector,
) -> Result<(Vec<String>, Vec<String>)> {
    with_endpoints(config, connector, |github_tools, google_tools| async move {
        let owned = |tools: &ToolSet| -> Vec<String> {
            tools.names().into_iter().map(str::to_string).collect()
        };
        Ok((owned(&github_tools), owned(&google_tools)))
    })
    .await
}

/// Outer failure report: the error, then a hint about the endpoints.
pub fn report_failure(err: &anyhow::Error, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Error connecting to or using one of the MCP servers: {:#}", err)?;
    writeln!(out, "Ensure the MCP servers are running and accessible.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knowledge_restricts_colors() {
        let knowledge = highlighting_knowledge();
        assert!(knowledge.content().starts_with("The text can be highlighted"));
        assert!(knowledge.content().contains("YOU CAN ONLY USE YELLOW"));
        assert!(knowledge.content().contains("Quant Trading/Asset Managers/Hedge Funds:"));
    }

    #[test]
    fn test_default_options() {
        let options = SyncOptions::default();
        assert_eq!(options.document_title, DEFAULT_DOCUMENT);
        assert_eq!(options.output_file, PathBuf::from("changes_to_internship_doc.md"));
        assert_eq!(options.max_iterations, 20);
    }

    #[test]
    fn test_report_failure_prints_two_lines() {
        let err = anyhow::anyhow!("connection refused").context("github endpoint");
        let mut out = Vec::new();
        report_failure(&err, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "Error connecting to or using one of the MCP servers: github endpoint: connection refused"
        );
        assert_eq!(lines[1], "Ensure the MCP servers are running and accessible.");
    }
}
