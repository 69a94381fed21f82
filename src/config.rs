//! Job descriptions and their validation.
//!
//! A [`JobSpec`] is what a caller submits: the node endpoint, the contracts to track, where to
//! store records and how hard to retry. [`JobSpec::validate`] checks it and resolves everything a
//! run needs (parsed addresses, loaded ABIs, defaults) into a [`ValidatedJob`] before any worker
//! starts.
//!
//! ```json
//! {
//!   "rpc_url": "http://localhost:8545",
//!   "start_block": 100,
//!   "contracts": [
//!     { "name": "C1", "address": "0x...c1", "abi": "abi/erc20.json", "events": ["Transfer"] }
//!   ],
//!   "storage": { "type": "csv", "output_dir": "out" },
//!   "retry": { "attempts": 3, "delay_ms": 1500 },
//!   "chunk_size": 1000
//! }
//! ```

use std::{
    io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    extractor::{AbiDecoder, TrackedContract},
    retry::{DEFAULT_ATTEMPTS, DEFAULT_DELAY, RetryPolicy},
};

/// Blocks per chunk when the job does not say.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000;

/// Worker count when none is given: the host's available parallelism, at least one.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("at least one contract must be defined")]
    NoContracts,

    #[error("contract at index {index} is missing {field}")]
    MissingContractField { index: usize, field: &'static str },

    #[error("contract '{contract}' has an invalid address '{value}'")]
    InvalidAddress { contract: String, value: String },

    #[error("contract '{contract}' repeats address {address}")]
    DuplicateAddress { contract: String, address: Address },

    #[error("abi file for contract '{contract}' cannot be read at {path}: {source}")]
    AbiUnreadable { contract: String, path: PathBuf, source: Arc<io::Error> },

    #[error("failed to parse abi for contract '{contract}': {reason}")]
    InvalidAbi { contract: String, reason: String },

    #[error("chunk_size must be greater than 0")]
    InvalidChunkSize,

    #[error("workers must be greater than 0")]
    InvalidWorkers,

    #[error("cannot read job file {path}: {source}")]
    Read { path: PathBuf, source: Arc<io::Error> },

    #[error("invalid job description: {0}")]
    Parse(String),
}

/// One contract to track.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub name: String,
    pub address: String,
    /// Path to a JSON ABI (or build artifact), or the ABI JSON itself.
    pub abi: String,
    /// Event allow-list; empty means all events.
    #[serde(default)]
    pub events: Vec<String>,
}

/// Where records go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageSpec {
    Csv { output_dir: PathBuf },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySpec {
    #[serde(default)]
    pub attempts: usize,
    #[serde(default)]
    pub delay_ms: u64,
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay_ms: u64::try_from(DEFAULT_DELAY.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl RetrySpec {
    /// Policy for node calls. Zero values fall back to the defaults.
    #[must_use]
    pub fn remote_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            if self.attempts == 0 { DEFAULT_ATTEMPTS } else { self.attempts },
            if self.delay_ms == 0 { DEFAULT_DELAY } else { Duration::from_millis(self.delay_ms) },
        )
    }

    /// The values as given.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_millis(self.delay_ms))
    }
}

/// A job as submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub rpc_url: String,
    #[serde(default)]
    pub start_block: u64,
    pub contracts: Vec<ContractSpec>,
    pub storage: StorageSpec,
    #[serde(default)]
    pub retry: RetrySpec,
    /// Sink retry; the node retry policy is used when absent.
    #[serde(default)]
    pub sink_retry: Option<RetrySpec>,
    #[serde(default)]
    pub chunk_size: Option<u64>,
    #[serde(default)]
    pub workers: Option<usize>,
    /// Directory of the resume checkpoint; the storage output directory when absent.
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// A checked job with everything resolved.
#[derive(Clone, Debug)]
pub struct ValidatedJob {
    pub rpc_url: String,
    pub start_block: u64,
    pub contracts: Vec<TrackedContract>,
    pub output_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub retry: RetryPolicy,
    pub sink_retry: RetryPolicy,
    pub chunk_size: u64,
    pub workers: usize,
}

impl JobSpec {
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON, unknown storage types or missing
    /// required fields.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Reads a job file. Relative paths inside it resolve against the file's directory.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            source: Arc::new(err),
        })?;
        let mut spec = Self::from_json_str(&raw)?;
        spec.base_dir = path.parent().map(Path::to_path_buf);
        Ok(spec)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Checks the job and loads every contract ABI.
    ///
    /// # Errors
    ///
    /// The first problem found, as a [`ConfigError`].
    pub fn validate(&self) -> Result<ValidatedJob, ConfigError> {
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingField("rpc_url"));
        }
        let StorageSpec::Csv { output_dir } = &self.storage;
        if output_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("storage.output_dir"));
        }
        if self.contracts.is_empty() {
            return Err(ConfigError::NoContracts);
        }
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        let workers = match self.workers {
            Some(0) => return Err(ConfigError::InvalidWorkers),
            Some(workers) => workers,
            None => default_workers(),
        };

        let mut contracts: Vec<TrackedContract> = Vec::with_capacity(self.contracts.len());
        for (index, spec) in self.contracts.iter().enumerate() {
            let contract = self.contract(index, spec)?;
            if contracts.iter().any(|known| known.address == contract.address) {
                return Err(ConfigError::DuplicateAddress {
                    contract: contract.name,
                    address: contract.address,
                });
            }
            contracts.push(contract);
        }

        let output_dir = self.resolve(output_dir);
        let checkpoint_dir =
            self.checkpoint_dir.as_deref().map_or_else(|| output_dir.clone(), |dir| self.resolve(dir));
        let retry = self.retry.remote_policy();

        Ok(ValidatedJob {
            rpc_url: self.rpc_url.trim().to_owned(),
            start_block: self.start_block,
            contracts,
            output_dir,
            checkpoint_dir,
            retry,
            sink_retry: self.sink_retry.map_or(retry, |spec| spec.policy()),
            chunk_size,
            workers,
        })
    }

    fn contract(&self, index: usize, spec: &ContractSpec) -> Result<TrackedContract, ConfigError> {
        if spec.name.trim().is_empty() {
            return Err(ConfigError::MissingContractField { index, field: "name" });
        }
        if spec.address.trim().is_empty() {
            return Err(ConfigError::MissingContractField { index, field: "address" });
        }
        if spec.abi.trim().is_empty() {
            return Err(ConfigError::MissingContractField { index, field: "abi" });
        }

        let address: Address = spec.address.trim().parse().map_err(|_| {
            ConfigError::InvalidAddress { contract: spec.name.clone(), value: spec.address.clone() }
        })?;

        let abi_json = if looks_inline(&spec.abi) {
            spec.abi.clone()
        } else {
            let path = self.resolve(Path::new(spec.abi.trim()));
            std::fs::read_to_string(&path).map_err(|err| ConfigError::AbiUnreadable {
                contract: spec.name.clone(),
                path,
                source: Arc::new(err),
            })?
        };
        let decoder = AbiDecoder::from_json(&abi_json).map_err(|err| ConfigError::InvalidAbi {
            contract: spec.name.clone(),
            reason: err.to_string(),
        })?;

        Ok(TrackedContract::new(spec.name.clone(), address, Arc::new(decoder))
            .with_events(spec.events.iter().cloned()))
    }
}

fn looks_inline(abi: &str) -> bool {
    matches!(abi.trim_start().chars().next(), Some('[' | '{'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ERC20_ABI;

    fn spec_json(abi: &str) -> String {
        serde_json::json!({
            "rpc_url": "http://localhost:8545",
            "start_block": 100,
            "contracts": [{
                "name": "C1",
                "address": "0x00000000000000000000000000000000000000c1",
                "abi": abi,
                "events": ["Transfer"]
            }],
            "storage": { "type": "csv", "output_dir": "out" }
        })
        .to_string()
    }

    #[test]
    fn applies_defaults() -> anyhow::Result<()> {
        let job = JobSpec::from_json_str(&spec_json(ERC20_ABI))?.validate()?;

        assert_eq!(job.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(job.retry, RetryPolicy::default());
        assert_eq!(job.sink_retry, job.retry);
        assert!(job.workers >= 1);
        assert_eq!(job.checkpoint_dir, PathBuf::from("out"));
        assert_eq!(job.contracts[0].events, vec!["Transfer"]);
        Ok(())
    }

    #[test]
    fn zero_retry_values_fall_back_to_defaults() {
        let spec = RetrySpec { attempts: 0, delay_ms: 0 };
        assert_eq!(spec.remote_policy(), RetryPolicy::default());
        assert_eq!(spec.policy(), RetryPolicy::new(0, Duration::ZERO));
    }

    #[test]
    fn unknown_storage_type_is_rejected() {
        let json = spec_json(ERC20_ABI).replace("\"csv\"", "\"mysql\"");
        assert!(matches!(JobSpec::from_json_str(&json), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn reports_missing_and_invalid_fields() -> anyhow::Result<()> {
        let base = JobSpec::from_json_str(&spec_json(ERC20_ABI))?;

        let mut spec = base.clone();
        spec.rpc_url = " ".into();
        assert!(matches!(spec.validate(), Err(ConfigError::MissingField("rpc_url"))));

        let mut spec = base.clone();
        spec.contracts.clear();
        assert!(matches!(spec.validate(), Err(ConfigError::NoContracts)));

        let mut spec = base.clone();
        spec.contracts[0].address = "0xnope".into();
        assert!(matches!(spec.validate(), Err(ConfigError::InvalidAddress { .. })));

        let mut spec = base.clone();
        spec.contracts[0].name.clear();
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::MissingContractField { index: 0, field: "name" })
        ));

        let mut spec = base.clone();
        spec.chunk_size = Some(0);
        assert!(matches!(spec.validate(), Err(ConfigError::InvalidChunkSize)));

        let mut spec = base.clone();
        spec.contracts.push(spec.contracts[0].clone());
        assert!(matches!(spec.validate(), Err(ConfigError::DuplicateAddress { .. })));

        let mut spec = base;
        spec.contracts[0].abi = "[{\"type\":\"event\"".into();
        assert!(matches!(spec.validate(), Err(ConfigError::InvalidAbi { .. })));
        Ok(())
    }

    #[test]
    fn load_resolves_paths_against_the_job_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir(dir.path().join("abi"))?;
        std::fs::write(dir.path().join("abi/erc20.json"), ERC20_ABI)?;
        let job_file = dir.path().join("job.json");
        std::fs::write(&job_file, spec_json("abi/erc20.json"))?;

        let job = JobSpec::load(&job_file)?.validate()?;

        assert_eq!(job.output_dir, dir.path().join("out"));
        assert_eq!(job.contracts[0].name, "C1");
        Ok(())
    }

    #[test]
    fn missing_abi_file_is_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let job_file = dir.path().join("job.json");
        std::fs::write(&job_file, spec_json("missing.json"))?;

        let err = JobSpec::load(&job_file)?.validate().unwrap_err();

        assert!(matches!(err, ConfigError::AbiUnreadable { .. }));
        Ok(())
    }
}
