//! gmg - examine the dependency graph of a Go module.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use gmg_core::ModuleId;
use gmg_graph::{
    requirements_go, unify_requirements, CompleteGraph, RequirementGraph,
};
use gmg_solver::{resolve_go, resolve_mvs, resolve_sat, DependencyGraph};
use gmg_toolchain::{resolve_version, GoToolchain, ModuleHost};

mod cli;
mod render;
mod telemetry;

use cli::{Cli, ColorMode, Format, RequirementsMode, ResolverMode};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.quiet);
    match cli.color {
        ColorMode::Always => console::set_colors_enabled(true),
        ColorMode::Never => console::set_colors_enabled(false),
        ColorMode::Auto => {}
    }
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("gmg: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let resolver = cli.effective_resolver().map_err(|msg| anyhow!(msg))?;
    let cancel = CancellationToken::new();
    let host: Arc<dyn ModuleHost> = Arc::new(GoToolchain::new());

    let mut root = ModuleId::parse(&cli.module);
    if root.check().is_err() {
        root = resolve_version(&cancel, host.as_ref(), &root)
            .await
            .with_context(|| format!("failed to resolve version of {}", cli.module))?;
    }

    let dg = resolve(&cli, resolver, &cancel, host, &root).await?;

    let output = match cli.format {
        Format::Tree => render::tree(&dg)?,
        Format::Raw => render::raw(&dg)?,
        Format::Dot => render::dot(&dg)?,
    };
    print!("{output}");
    Ok(())
}

async fn resolve(
    cli: &Cli,
    resolver: ResolverMode,
    cancel: &CancellationToken,
    host: Arc<dyn ModuleHost>,
    root: &ModuleId,
) -> anyhow::Result<DependencyGraph> {
    // The host resolver is only sound against the host's own pruned graph,
    // which the types enforce; the flag consistency rule has already ruled
    // out the other combinations.
    if resolver == ResolverMode::Go {
        let rg = Arc::new(requirements_go(cancel, host.clone(), root).await?);
        return Ok(resolve_go(cancel, host, rg).await?);
    }

    let mut rg: Arc<dyn RequirementGraph> = match cli.requirements {
        RequirementsMode::Go => Arc::new(requirements_go(cancel, host.clone(), root).await?),
        RequirementsMode::Complete => CompleteGraph::build(host.clone(), root.clone(), cancel)?,
    };
    if cli.unify {
        rg = Arc::new(unify_requirements(cancel, rg).await?);
    }
    let dg = match resolver {
        ResolverMode::Mvs => resolve_mvs(cancel, rg).await?,
        ResolverMode::Sat => resolve_sat(cancel, rg).await?,
        ResolverMode::Go => unreachable!("handled above"),
    };
    Ok(dg)
}
