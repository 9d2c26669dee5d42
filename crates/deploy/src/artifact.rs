//! Compiled contract artifacts.
//!
//! Artifacts are opaque `{abi, bytecode}` pairs. The only thing done with the
//! bytecode is appending ABI-encoded constructor arguments to it.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use alloy_core::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi},
    primitives::Bytes,
};
use serde::Deserialize;

use crate::DeployError;

/// Bytecode as found in Foundry (`{"object": "0x.."}`) or Hardhat (`"0x.."`) artifacts.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Object { object: Bytes },
    Hex(Bytes),
}

#[derive(Deserialize)]
struct RawArtifact {
    abi: JsonAbi,
    bytecode: RawBytecode,
}

/// ABI and creation bytecode of one contract.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub contract: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Parse an artifact from its JSON representation.
    pub fn from_json(contract: impl Into<String>, json: &str) -> Result<Self, DeployError> {
        let contract = contract.into();
        let raw: RawArtifact =
            serde_json::from_str(json).map_err(|e| DeployError::artifact(&contract, e))?;

        let bytecode = match raw.bytecode {
            RawBytecode::Object { object } => object,
            RawBytecode::Hex(bytes) => bytes,
        };

        Ok(Self {
            contract,
            abi: raw.abi,
            bytecode,
        })
    }

    /// Creation bytecode followed by the encoded constructor arguments.
    ///
    /// Each argument is coerced against the matching constructor parameter
    /// type, so `"18"` becomes a `uint8` and `"(1,0x..,2)"` a tuple.
    pub fn deploy_data(&self, args: &[String]) -> Result<Bytes, DeployError> {
        if self.bytecode.is_empty() {
            return Err(DeployError::artifact(
                &self.contract,
                "artifact has no creation bytecode (abstract contract or interface?)",
            ));
        }

        let inputs = self
            .abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            return Err(DeployError::InvalidArgument {
                component: self.contract.clone(),
                reason: format!(
                    "constructor takes {} arguments, {} given",
                    inputs.len(),
                    args.len()
                ),
            });
        }

        let values = inputs
            .iter()
            .zip(args)
            .map(|(param, raw)| {
                let ty = param
                    .resolve()
                    .map_err(|e| DeployError::artifact(&self.contract, e))?;
                ty.coerce_str(raw).map_err(|e| DeployError::InvalidArgument {
                    component: self.contract.clone(),
                    reason: format!("`{raw}` is not a valid `{}` for `{}`: {e}", param.ty, param.name),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = self.bytecode.to_vec();
        data.extend_from_slice(&DynSolValue::Tuple(values).abi_encode_params());

        Ok(data.into())
    }

    /// Look up a function by name. Overloads resolve to the first declaration.
    pub fn function(&self, name: &str) -> Result<&Function, DeployError> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| {
                DeployError::artifact(&self.contract, format!("no function named `{name}` in ABI"))
            })
    }

    /// Calldata for `function(args...)`.
    pub fn encode_call(&self, function: &str, args: &[DynSolValue]) -> Result<Bytes, DeployError> {
        self.function(function)?
            .abi_encode_input(args)
            .map(Bytes::from)
            .map_err(|e| DeployError::artifact(&self.contract, e))
    }

    /// Decode the return data of `function`.
    pub fn decode_output(
        &self,
        function: &str,
        data: &[u8],
    ) -> Result<Vec<DynSolValue>, DeployError> {
        self.function(function)?
            .abi_decode_output(data)
            .map_err(|e| DeployError::artifact(&self.contract, e))
    }
}

/// Loads artifacts from a Foundry `out/` style directory and caches them.
///
/// The artifact of contract `Foo` is read from `<root>/Foo.sol/Foo.json`.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    cache: Mutex<HashMap<String, Arc<ContractArtifact>>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn artifact_path(&self, contract: &str) -> PathBuf {
        self.root
            .join(format!("{contract}.sol"))
            .join(format!("{contract}.json"))
    }

    /// Load (or fetch from cache) the artifact of `contract`.
    pub fn load(&self, contract: &str) -> Result<Arc<ContractArtifact>, DeployError> {
        if let Some(artifact) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(contract)
        {
            return Ok(artifact.clone());
        }

        let path = self.artifact_path(contract);
        let json = std::fs::read_to_string(&path).map_err(|e| {
            DeployError::artifact(contract, format!("failed to read {}: {e}", path.display()))
        })?;
        let artifact = Arc::new(ContractArtifact::from_json(contract, &json)?);

        tracing::debug!(contract, path = %path.display(), "Artifact loaded");

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(contract.to_string(), artifact.clone());

        Ok(artifact)
    }
}
