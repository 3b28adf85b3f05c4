use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use contentlens::api::{start_server_on, ApiContext};
use contentlens::config::{self, ProviderConfig};
use contentlens::pipeline::analysis::{
    decode_events, run_analysis, HttpProviderFactory, LineDecoder, NdjsonWriter, PipelineView,
    PriorOutputs, RunOutcome,
};

mod cli;
use cli::{AnalyzeArgs, Cli, Command, ServeArgs};

fn main() -> ExitCode {
    contentlens::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve(args) => serve(args),
        Command::Analyze(args) => analyze(args),
    };

    match result {
        Ok(code) => code,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn serve(args: ServeArgs) -> Result<ExitCode, String> {
    let bind = args.bind.unwrap_or_else(config::bind_addr_from_env);
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| format!("Invalid listen address '{bind}': {e}"))?;

    let provider_config = ProviderConfig::from_env();
    tracing::info!(config = ?provider_config, "{} v{} starting", config::APP_NAME, config::APP_VERSION);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;

    runtime.block_on(async move {
        let mut server = start_server_on(addr, ApiContext::from_config(provider_config)).await?;
        tracing::info!(addr = %server.session.server_addr, "Listening");

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
        }
        server.shutdown();
        server.stopped().await;
        Ok(ExitCode::SUCCESS)
    })
}

fn analyze(args: AnalyzeArgs) -> Result<ExitCode, String> {
    let content = read_input(&args.input)?;
    let prior = match &args.previous {
        Some(path) => read_previous(path)?,
        None => PriorOutputs::default(),
    };
    let factory = HttpProviderFactory::new(ProviderConfig::from_env());

    let outcome = if args.summary {
        let mut writer = NdjsonWriter::new(Vec::new());
        let outcome = run_analysis(&factory, &content, args.from_stage, prior, &mut writer)
            .map_err(|e| e.to_string())?;

        let mut decoder = LineDecoder::new();
        let mut lines = decoder.push(&writer.into_inner());
        lines.extend(decoder.finish());
        let view = PipelineView::fold(&decode_events(lines));

        let pretty = serde_json::to_string_pretty(&view)
            .map_err(|e| format!("Failed to render summary: {e}"))?;
        println!("{pretty}");
        outcome
    } else {
        let stdout = std::io::stdout();
        let mut writer = NdjsonWriter::new(stdout.lock());
        run_analysis(&factory, &content, args.from_stage, prior, &mut writer)
            .map_err(|e| e.to_string())?
    };

    Ok(match outcome {
        RunOutcome::Completed { .. } => ExitCode::SUCCESS,
        RunOutcome::Failed { .. } | RunOutcome::Cancelled { .. } => ExitCode::FAILURE,
    })
}

fn read_input(path: &Path) -> Result<String, String> {
    if path == Path::new("-") {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .map_err(|e| format!("Failed to read stdin: {e}"))?;
        return Ok(content);
    }
    std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))
}

fn read_previous(path: &Path) -> Result<PriorOutputs, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("Invalid previous outputs in {}: {e}", path.display()))
}
