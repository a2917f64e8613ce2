//! PixelPrompt - 终端里的像素智能体小屋
//!
//! 入口：解析命令行、初始化日志、加载配置、构建后端注册表与推理编排器，运行 TUI 主循环；
//! `--check` 只做环境诊断后退出。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pixelprompt::{
    config::{load_config, AppConfig},
    core::{Engine, InferenceOrchestrator, ResponseRouter},
    llm::{check_providers, CheckStatus, ProviderRegistry},
    observability,
    ui::run_app,
};

#[derive(Debug, Parser)]
#[command(name = "pixelprompt")]
#[command(about = "Pixel agents chatting with local LLMs, in your terminal", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（不存在时写入默认配置）
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// 输出 debug 级别日志
    #[arg(long)]
    debug: bool,

    /// 只做环境诊断（配置、后端连通性、模型列表）后退出
    #[arg(long)]
    check: bool,

    /// 日志目录
    #[arg(long, default_value = "logs", env = "PIXELPROMPT_LOG_DIR")]
    log_dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.debug { "debug" } else { "info" };

    let result = if cli.check {
        observability::init_stderr(level).and_then(|_| run_check(&cli))
    } else {
        run(&cli, level)
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "PixelPrompt exited with error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, level: &str) -> anyhow::Result<ExitCode> {
    let log_path = observability::init_file(level, &cli.log_dir)?;
    tracing::info!(log = %log_path.display(), "PixelPrompt starting");

    let config = load_config(Some(cli.config.clone()))
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    let registry = ProviderRegistry::from_config(&config);
    if registry.is_empty() {
        anyhow::bail!("No LLM provider could be initialized; enable one in {}", cli.config.display());
    }
    tracing::info!(providers = ?registry.names(), "Providers ready");

    let mut orchestrator = InferenceOrchestrator::new(Arc::new(registry), config.orchestrator.to_options())
        .with_span(tracing::info_span!("orchestrator"));
    orchestrator.start().context("Failed to start inference worker")?;

    let chat_options = config.chat.to_options();
    if !chat_options.is_empty() {
        tracing::info!(?chat_options, "Using generation options");
    }
    let router = ResponseRouter::new(orchestrator).with_chat_options(chat_options);
    let mut engine = Engine::new(&config, router);
    let result = run_app(&mut engine, &config).context("App run failed");

    if !engine.shutdown(config.orchestrator.stop_timeout()) {
        tracing::warn!("Inference worker still busy at exit");
    }
    tracing::info!("PixelPrompt stopped");

    result.map(|_| ExitCode::SUCCESS)
}

fn run_check(cli: &Cli) -> anyhow::Result<ExitCode> {
    println!();
    println!("{}", "=".repeat(60));
    println!("  PIXELPROMPT ENVIRONMENT DIAGNOSTICS");
    println!("{}", "=".repeat(60));

    let config = match load_config(Some(cli.config.clone())) {
        Ok(config) => {
            println!("[OK]   Config loaded: {}", cli.config.display());
            config
        }
        Err(e) => {
            println!("[FAIL] Config error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build diagnostics runtime")?;
    let reports = runtime.block_on(check_providers(&config));

    println!();
    println!("Providers:");
    if reports.is_empty() {
        println!("  [WARN] No providers enabled");
    }
    for report in &reports {
        match &report.status {
            CheckStatus::Ready { models } if models.is_empty() => {
                println!("  [OK]   {} reachable, but no models found", report.name);
                if report.name == "ollama" {
                    println!("         Run: ollama pull {}", default_model(&config, &report.name));
                }
            }
            CheckStatus::Ready { models } => {
                println!("  [OK]   {} ({} models): {}", report.name, models.len(), models.join(", "));
            }
            CheckStatus::Unavailable => {
                println!("  [FAIL] {} not responding", report.name);
                if report.name == "ollama" {
                    println!("         Start it with: ollama serve");
                }
            }
            CheckStatus::Failed(e) => println!("  [WARN] {}: {e}", report.name),
        }
    }

    println!();
    println!("Agents:");
    for agent in &config.agents {
        println!("  {} ({}) -> {} / {}", agent.name, agent.id, agent.provider, agent.model);
    }

    let ready = reports.iter().any(|r| r.is_ready());
    println!();
    println!("{}", "=".repeat(60));
    if ready {
        println!("[SUCCESS] All systems ready!");
    } else {
        println!("[WARN] Config valid, but no LLM provider is available");
    }
    println!("{}", "=".repeat(60));
    println!();

    Ok(if ready { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn default_model<'a>(config: &'a AppConfig, provider: &str) -> &'a str {
    config
        .llm_providers
        .get(provider)
        .and_then(|p| p.default_model.as_deref())
        .unwrap_or("llama3.2:3b")
}
