use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use serde::Deserialize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VenueKind {
    #[default]
    #[clap(name = "dry-run")]
    DryRun,
    #[clap(name = "none")]
    #[serde(alias = "none")]
    Unconfigured,
}

impl fmt::Display for VenueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry-run"),
            Self::Unconfigured => write!(f, "none"),
        }
    }
}

impl FromStr for VenueKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dry-run" | "dryrun" | "paper" => Ok(Self::DryRun),
            "none" | "unconfigured" => Ok(Self::Unconfigured),
            other => Err(anyhow!("unknown venue kind: {other}")),
        }
    }
}
