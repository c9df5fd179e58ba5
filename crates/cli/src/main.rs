use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lib::capabilities::FileCapabilitySource;
use lib::trigger::MatchLimit;
use lib::{Engine, LoadError, ResolutionRequest, SkillSelection};

#[derive(Parser)]
#[command(name = "ctxres")]
#[command(about = "Context resolution engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Load the workspace manifest and connectors, print counts and every load error.
    Check {
        /// Config file path (default: CTXRES_CONFIG_PATH or ~/.ctxres/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Rank skills whose trigger topics overlap the given text.
    Match {
        /// Config file path (default: CTXRES_CONFIG_PATH or ~/.ctxres/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Free text to match against skill trigger topics.
        #[arg(long, short)]
        text: String,

        /// Return at most K matches.
        #[arg(long, value_name = "K", conflicts_with = "all")]
        top: Option<usize>,

        /// Return every skill with nonzero overlap.
        #[arg(long)]
        all: bool,
    },

    /// Resolve a request and print the context bundle as JSON.
    Resolve {
        /// Config file path (default: CTXRES_CONFIG_PATH or ~/.ctxres/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Free text of the request.
        #[arg(long, short, default_value = "")]
        text: String,

        /// Prompt template to invoke.
        #[arg(long, value_name = "NAME")]
        prompt: Option<String>,

        /// Prompt parameter, repeatable.
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Agent persona to activate.
        #[arg(long, value_name = "NAME")]
        persona: Option<String>,

        /// Include at most K matched skills.
        #[arg(long, value_name = "K", conflicts_with = "all")]
        top: Option<usize>,

        /// Include every matched skill, ignoring the configured cap.
        #[arg(long)]
        all: bool,
    },

    /// Resolve free text interactively; reloads the manifest when it changes on disk.
    Repl {
        /// Config file path (default: CTXRES_CONFIG_PATH or ~/.ctxres/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("ctxres {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Check { config }) => {
            if let Err(e) = run_check(config) {
                log::error!("check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Match {
            config,
            text,
            top,
            all,
        }) => {
            if let Err(e) = run_match(config, &text, top, all) {
                log::error!("match failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Resolve {
            config,
            text,
            prompt,
            params,
            persona,
            top,
            all,
        }) => {
            let skills = match (top, all) {
                (Some(k), _) => Some(SkillSelection::TopK(k)),
                (None, true) => Some(SkillSelection::All),
                (None, false) => None,
            };
            if let Err(e) = run_resolve(config, text, prompt, params, persona, skills) {
                eprintln!("resolve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Repl { config }) => {
            if let Err(e) = run_repl(config).await {
                log::error!("repl failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn open_engine(config_path: Option<PathBuf>) -> anyhow::Result<(Engine, lib::config::Config, PathBuf)> {
    let (config, path) = lib::config::load_config(config_path)?;
    let (engine, errors) = Engine::open(&config, &path)?;
    for e in &errors {
        log::warn!("{}", e);
    }
    Ok((engine, config, path))
}

fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    println!(
        "manifest: {}",
        lib::config::resolve_manifest_path(&config, &path).display()
    );
    let (engine, errors) = match Engine::open(&config, &path) {
        Ok(opened) => opened,
        Err(e) => {
            if e.downcast_ref::<LoadError>().is_some_and(LoadError::is_fatal) {
                println!("fatal: workspace rejected");
            }
            return Err(e);
        }
    };
    let snapshot = engine.registry().current();
    let capabilities = engine.capabilities().current();
    println!(
        "instructions: {}, prompts: {}, agents: {}, skills: {}, connectors: {}",
        snapshot.instructions.len(),
        snapshot.prompts.len(),
        snapshot.agents.len(),
        snapshot.skills.len(),
        capabilities.len()
    );
    for id in capabilities.connector_ids() {
        println!("  connector {}", id);
    }
    if errors.is_empty() {
        println!("no load errors");
    } else {
        println!("{} load error(s):", errors.len());
        for e in &errors {
            println!("  - {}", e);
        }
    }
    Ok(())
}

fn run_match(
    config_path: Option<PathBuf>,
    text: &str,
    top: Option<usize>,
    all: bool,
) -> anyhow::Result<()> {
    let (engine, config, _) = open_engine(config_path)?;
    let limit = match (top, all) {
        (Some(k), _) => MatchLimit::TopK(k),
        (None, true) => MatchLimit::AllNonzero { cap: usize::MAX },
        (None, false) => MatchLimit::AllNonzero {
            cap: config.resolver.max_skills,
        },
    };
    let matches = engine.match_skills(text, limit);
    if matches.is_empty() {
        println!("no matching skills");
    }
    for m in &matches {
        println!("{:>3}  {}  [{}]", m.overlap, m.name, m.matched_terms.join(", "));
    }
    Ok(())
}

fn run_resolve(
    config_path: Option<PathBuf>,
    text: String,
    prompt: Option<String>,
    params: Vec<(String, String)>,
    persona: Option<String>,
    skills: Option<SkillSelection>,
) -> anyhow::Result<()> {
    let (engine, _, _) = open_engine(config_path)?;
    let mut request = ResolutionRequest::new(text);
    if let Some(selection) = skills {
        request = request.with_skills(selection);
    }
    if let Some(name) = prompt {
        request = request.with_prompt(name, params);
    } else if !params.is_empty() {
        anyhow::bail!("--param requires --prompt");
    }
    if let Some(name) = persona {
        request = request.with_persona(name);
    }
    let bundle = engine.resolve(&request)?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

async fn run_repl(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (engine, config, path) = open_engine(config_path)?;
    let manifest = lib::config::resolve_manifest_path(&config, &path);
    let connectors = lib::config::resolve_connectors_path(&config, &path);
    let source = FileCapabilitySource::new(connectors.clone());
    let mut manifest_mtime = lib::workspace::modified_at(&manifest);
    let mut connectors_mtime = lib::workspace::modified_at(&connectors);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        let mtime = lib::workspace::modified_at(&manifest);
        if mtime != manifest_mtime {
            manifest_mtime = mtime;
            match engine.reload_from(&manifest) {
                Ok(errors) => {
                    for e in &errors {
                        eprintln!("load error: {}", e);
                    }
                }
                Err(e) => eprintln!("reload rejected, keeping previous workspace: {:#}", e),
            }
        }

        let mtime = lib::workspace::modified_at(&connectors);
        if mtime != connectors_mtime {
            connectors_mtime = mtime;
            if let Err(e) = engine
                .refresh_capabilities(&source, config.capability_timeout())
                .await
            {
                eprintln!("capability refresh failed: {}", e);
            }
        }

        match engine.resolve(&ResolutionRequest::new(input)) {
            Ok(bundle) => {
                for layer in &bundle.layers {
                    println!("< [{}] {} {}", layer.priority, layer.source, layer.identifier);
                }
                for warning in &bundle.conflicts {
                    println!("! {}", serde_json::to_string(warning)?);
                }
            }
            Err(e) => eprintln!("resolve error: {}", e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_param_splits_on_first_equals() {
        assert_eq!(
            parse_param("DEPTH_LEVEL=Basic").unwrap(),
            ("DEPTH_LEVEL".to_string(), "Basic".to_string())
        );
        assert_eq!(
            parse_param("QUERY=a=b").unwrap(),
            ("QUERY".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_param("EMPTY=").unwrap().1, "");
    }

    #[test]
    fn parse_param_rejects_missing_key() {
        assert!(parse_param("no-equals").is_err());
        assert!(parse_param("=value").is_err());
    }

    #[test]
    fn cli_parses_repeated_params() {
        let cli = Cli::try_parse_from([
            "ctxres",
            "resolve",
            "--text",
            "document it",
            "--prompt",
            "blueprint-generator",
            "--param",
            "DEPTH_LEVEL=Basic",
            "--param",
            "OUTPUT_FORMAT=JSON",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Resolve { params, prompt, .. }) => {
                assert_eq!(prompt.as_deref(), Some("blueprint-generator"));
                assert_eq!(params.len(), 2);
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn resolve_accepts_all_but_not_with_top() {
        let cli = Cli::try_parse_from(["ctxres", "resolve", "--text", "testing", "--all"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Resolve { all: true, top: None, .. })));
        assert!(Cli::try_parse_from(["ctxres", "resolve", "--text", "t", "--all", "--top", "2"]).is_err());
    }
}
