//! CLI for Easel - resilient AI image generation.

use clap::{Args, Parser, Subcommand, ValueEnum};
use easel::{
    Feature, GenerationRequest, ImagePayload, ImageRef, Orchestrator, OrchestratorConfig,
    ProviderKind,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "easel")]
#[command(about = "Generate and edit images via AI providers (Gemini, OpenAI, OpenRouter)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate or edit an image from a text prompt
    Generate(GenerateArgs),

    /// List available providers
    Providers,
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the desired image
    prompt: String,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,

    /// Provider to use
    #[arg(short, long, value_enum, default_value = "gemini")]
    provider: ProviderArg,

    /// Which user action this request belongs to
    #[arg(long, value_enum, default_value = "generate")]
    feature: FeatureArg,

    /// Source image(s) for editing (paths, repeatable)
    #[arg(short, long)]
    input: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Gemini,
    Openai,
    Openrouter,
}

impl From<ProviderArg> for ProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Gemini => ProviderKind::Gemini,
            ProviderArg::Openai => ProviderKind::OpenAi,
            ProviderArg::Openrouter => ProviderKind::OpenRouter,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FeatureArg {
    Generate,
    Edit,
    Inpaint,
}

impl From<FeatureArg> for Feature {
    fn from(arg: FeatureArg) -> Self {
        match arg {
            FeatureArg::Generate => Feature::Generate,
            FeatureArg::Edit => Feature::Edit,
            FeatureArg::Inpaint => Feature::Inpaint,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => {
            generate(args, cli.json).await?;
        }
        Commands::Providers => {
            list_providers(cli.json)?;
        }
    }

    Ok(())
}

async fn generate(args: GenerateArgs, json_output: bool) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::builder()
        .config(OrchestratorConfig::from_env())
        .build()?;

    let mut request = GenerationRequest::new(&args.prompt)
        .with_provider(args.provider.into())
        .with_feature(args.feature.into());
    for path in &args.input {
        request = request.with_image(ImageRef::from_bytes(std::fs::read(path)?)?);
    }

    let image = orchestrator.run(request).await?;

    let written = match &image.payload {
        ImagePayload::Inline { .. } => {
            image.save(&args.output)?;
            image.size()
        }
        ImagePayload::Url(url) => {
            let bytes = reqwest::get(url).await?.error_for_status()?.bytes().await?;
            std::fs::write(&args.output, &bytes)?;
            bytes.len()
        }
    };

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "output": args.output.display().to_string(),
            "size_bytes": written,
            "provider": image.metadata.provider.map(|p| p.to_string()),
            "model": image.metadata.model,
            "duration_ms": image.metadata.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Generated image: {} ({} bytes)",
            args.output.display(),
            written
        );
        if let Some(duration) = image.metadata.duration_ms {
            println!("Duration: {}ms", duration);
        }
    }

    Ok(())
}

fn list_providers(json_output: bool) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct ProviderInfo {
        name: &'static str,
        kind: &'static str,
        env_var: &'static str,
        enabled: bool,
    }

    let providers = vec![
        ProviderInfo {
            name: "Gemini (Google)",
            kind: "gemini",
            env_var: "GOOGLE_API_KEY",
            enabled: cfg!(feature = "gemini"),
        },
        ProviderInfo {
            name: "OpenAI Images",
            kind: "openai",
            env_var: "OPENAI_API_KEY",
            enabled: cfg!(feature = "openai"),
        },
        ProviderInfo {
            name: "OpenRouter",
            kind: "openrouter",
            env_var: "OPENROUTER_API_KEY",
            enabled: cfg!(feature = "openrouter"),
        },
    ];

    if json_output {
        println!("{}", serde_json::to_string_pretty(&providers)?);
    } else {
        println!("Available providers:\n");
        for p in &providers {
            let status = if p.enabled { "+" } else { "-" };
            println!("  {} {} ({})", status, p.name, p.kind);
            println!("    API key: {} (or {}S for a rotation list)", p.env_var, p.env_var);
        }
    }

    Ok(())
}
