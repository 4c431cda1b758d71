//! CLI argument parsing.

use clap::{ArgAction, Parser, ValueEnum};

/// gmg - examine the dependency graph of a Go module
#[derive(Parser, Debug)]
#[command(name = "gmg")]
#[command(version, about = "Examine the dependency graph of a Go module")]
#[command(
    after_help = "The module argument has the form path[@version]; a missing or \
non-canonical version is resolved as a version query (e.g. `latest`)."
)]
pub struct Cli {
    /// Root module, as path[@version]
    pub module: String,

    /// How to collect the requirement graph
    #[arg(long, value_enum, default_value = "go")]
    pub requirements: RequirementsMode,

    /// Unify requirement versions before resolving (implies `--resolver mvs`
    /// unless a resolver is given)
    #[arg(short, long)]
    pub unify: bool,

    /// Dependency resolution algorithm (defaults to `go`, or to `mvs` when
    /// `--requirements complete` or `--unify` is given)
    #[arg(long, value_enum)]
    pub resolver: Option<ResolverMode>,

    /// Output format
    #[arg(long, value_enum, default_value = "tree")]
    pub format: Format,

    /// When to color the output
    #[arg(long, value_enum, default_value = "auto")]
    pub color: ColorMode,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Decrease log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementsMode {
    /// The host toolchain's pruned requirement graph
    Go,
    /// The complete transitive closure of go.mod requirements
    Complete,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverMode {
    /// The host toolchain's own selection
    Go,
    /// Native Minimal Version Selection
    Mvs,
    /// SAT-encoded selection, minimizing the number of modules
    Sat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Indented dependency tree
    Tree,
    /// Sorted flat list of selected modules
    Raw,
    /// Graphviz digraph
    Dot,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl Cli {
    /// The resolver to run, applying the flag-dependent default: selecting
    /// the complete requirement graph or unification silently upgrades an
    /// unset resolver from `go` to `mvs`. An explicit `go` resolver is
    /// incompatible with both.
    pub fn effective_resolver(&self) -> Result<ResolverMode, String> {
        let non_go_requirements = self.requirements != RequirementsMode::Go;
        match self.resolver {
            Some(ResolverMode::Go) if non_go_requirements => {
                Err("the go resolver requires the go requirements collector".to_string())
            }
            Some(ResolverMode::Go) if self.unify => {
                Err("--unify cannot be combined with the go resolver".to_string())
            }
            Some(resolver) => Ok(resolver),
            None if non_go_requirements || self.unify => Ok(ResolverMode::Mvs),
            None => Ok(ResolverMode::Go),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gmg").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["example.com/foo"]);
        assert_eq!(cli.requirements, RequirementsMode::Go);
        assert_eq!(cli.effective_resolver(), Ok(ResolverMode::Go));
        assert_eq!(cli.format, Format::Tree);
        assert!(!cli.unify);
    }

    #[test]
    fn test_complete_upgrades_resolver() {
        let cli = parse(&["--requirements", "complete", "example.com/foo"]);
        assert_eq!(cli.effective_resolver(), Ok(ResolverMode::Mvs));
    }

    #[test]
    fn test_unify_upgrades_resolver() {
        let cli = parse(&["-u", "example.com/foo"]);
        assert_eq!(cli.effective_resolver(), Ok(ResolverMode::Mvs));
    }

    #[test]
    fn test_explicit_resolver_not_upgraded() {
        let cli = parse(&["--requirements", "complete", "--resolver", "sat", "example.com/foo"]);
        assert_eq!(cli.effective_resolver(), Ok(ResolverMode::Sat));
    }

    #[test]
    fn test_go_resolver_requires_go_requirements() {
        let cli = parse(&["--requirements", "complete", "--resolver", "go", "example.com/foo"]);
        assert!(cli.effective_resolver().is_err());
    }

    #[test]
    fn test_go_resolver_rejects_unify() {
        let cli = parse(&["-u", "--resolver", "go", "example.com/foo"]);
        assert!(cli.effective_resolver().is_err());
    }
}
