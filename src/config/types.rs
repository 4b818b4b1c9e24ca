//! Configuration types

use serde::Deserialize;
use std::time::Duration;

use crate::compress::{AlgorithmKind, CompressConfig};
use crate::fsm::ccp::CcpConfig;
use crate::fsm::lcp::LcpConfig;
use crate::fsm::{FsmConfig, OpenMode};
use crate::hdlc::FramingMode;
use crate::link::LinkConfig;
use crate::telemetry::LogConfig;
use crate::vj::{VjConfig, MAX_SLOTS};
use crate::{Error, Result};

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub fsm: FsmSection,
    #[serde(default)]
    pub ccp: CcpSection,
    #[serde(default)]
    pub vj: VjSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkSection {
    #[serde(default)]
    pub framing: Framing,
    #[serde(default)]
    pub mode: Mode,
    pub mru: Option<u16>,
    /// Control characters that must be escaped towards us
    #[serde(default)]
    pub accm: u32,
    #[serde(default)]
    pub pfc: bool,
    #[serde(default)]
    pub acfc: bool,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            framing: Framing::Async,
            mode: Mode::Active,
            mru: None,
            accm: 0,
            pfc: false,
            acfc: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    #[default]
    Async,
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Active,
    Passive,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FsmSection {
    /// Retransmission interval in seconds
    pub timeout: u64,
    pub max_configure: u32,
    pub max_terminate: u32,
    pub max_failure: u32,
}

impl Default for FsmSection {
    fn default() -> Self {
        let d = FsmConfig::default();
        Self {
            timeout: d.timeout.as_secs(),
            max_configure: d.max_configure,
            max_terminate: d.max_terminate,
            max_failure: d.max_failure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Deflate,
    Predictor1,
}

impl From<Algorithm> for AlgorithmKind {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Deflate => AlgorithmKind::Deflate,
            Algorithm::Predictor1 => AlgorithmKind::Predictor1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CcpSection {
    pub enabled: bool,
    /// Algorithms we accept, most preferred first
    pub algorithms: Vec<Algorithm>,
    pub deflate_window: u8,
}

impl Default for CcpSection {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithms: vec![Algorithm::Deflate, Algorithm::Predictor1],
            deflate_window: CompressConfig::default().deflate_window,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VjSection {
    pub enabled: bool,
    pub slots: usize,
    pub compress_cid: bool,
}

impl Default for VjSection {
    fn default() -> Self {
        let d = VjConfig::default();
        Self {
            enabled: d.enabled,
            slots: d.slots,
            compress_cid: d.compress_cid,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    pub level: String,
    pub format: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl Config {
    /// Reject settings the protocol machinery cannot honor.
    pub fn validate(&self) -> Result<()> {
        if let Some(mru) = self.link.mru {
            if mru < 128 {
                return Err(Error::Config(format!("mru {mru} below the minimum of 128")));
            }
        }
        if self.fsm.timeout == 0 {
            return Err(Error::Config("fsm timeout must be at least 1 second".into()));
        }
        if self.fsm.max_configure == 0 {
            return Err(Error::Config("max_configure must be at least 1".into()));
        }
        if !(8..=15).contains(&self.ccp.deflate_window) {
            return Err(Error::Config(format!(
                "deflate_window {} outside 8..=15",
                self.ccp.deflate_window
            )));
        }
        if self.ccp.enabled && self.ccp.algorithms.is_empty() {
            return Err(Error::Config(
                "ccp enabled with an empty algorithm list".into(),
            ));
        }
        if !(2..=MAX_SLOTS).contains(&self.vj.slots) {
            return Err(Error::Config(format!(
                "vj slots {} outside 2..={MAX_SLOTS}",
                self.vj.slots
            )));
        }
        Ok(())
    }

    /// Runtime link settings derived from this configuration.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            framing: match self.link.framing {
                Framing::Async => FramingMode::Async,
                Framing::Sync => FramingMode::Sync,
            },
            lcp: LcpConfig {
                mru: self.link.mru.unwrap_or(LcpConfig::default().mru),
                accm: self.link.accm,
                pfc: self.link.pfc,
                acfc: self.link.acfc,
            },
            ccp: CcpConfig {
                algorithms: if self.ccp.enabled {
                    self.ccp.algorithms.iter().map(|&a| a.into()).collect()
                } else {
                    Vec::new()
                },
                compress: CompressConfig {
                    deflate_window: self.ccp.deflate_window,
                },
            },
            fsm: FsmConfig {
                mode: match self.link.mode {
                    Mode::Active => OpenMode::Active,
                    Mode::Passive => OpenMode::Passive,
                },
                timeout: Duration::from_secs(self.fsm.timeout),
                max_configure: self.fsm.max_configure,
                max_terminate: self.fsm.max_terminate,
                max_failure: self.fsm.max_failure,
            },
            vj: VjConfig {
                enabled: self.vj.enabled,
                slots: self.vj.slots,
                compress_cid: self.vj.compress_cid,
            },
        }
    }

    /// Logging settings in the form the telemetry layer expects.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log.level.clone(),
            format: self.log.format.clone(),
        }
    }
}
