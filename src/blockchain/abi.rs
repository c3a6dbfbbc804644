// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Runtime ABI encoding for delegated calls.
//!
//! Function arguments arrive as strings from the HTTP surface and are
//! coerced against a human-readable Solidity signature such as
//! `transfer(address to,uint256 value)`.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt},
    json_abi::Function,
    primitives::keccak256,
};

/// ABI encoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    #[error("Invalid function signature: {0}")]
    InvalidSignature(String),

    #[error("Expected {expected} arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("Invalid argument #{index} ({name}): {reason}")]
    InvalidArgument {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// A named, typed function argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    pub name: String,
    pub ty: String,
}

/// A parsed Solidity function signature.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    function: Function,
}

impl FunctionSignature {
    pub fn parse(signature: &str) -> Result<Self, AbiError> {
        let function = Function::parse(signature)
            .map_err(|e| AbiError::InvalidSignature(format!("{}: {}", signature, e)))?;
        for param in &function.inputs {
            DynSolType::parse(&param.ty)
                .map_err(|e| AbiError::InvalidSignature(format!("{}: {}", param.ty, e)))?;
        }
        Ok(Self { function })
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Canonical signature without argument names, e.g. `transfer(address,uint256)`.
    pub fn canonical(&self) -> String {
        self.function.signature()
    }

    pub fn arguments(&self) -> Vec<ArgumentDescriptor> {
        self.function
            .inputs
            .iter()
            .map(|param| ArgumentDescriptor {
                name: param.name.clone(),
                ty: param.ty.clone(),
            })
            .collect()
    }

    /// Coerce string arguments into typed ABI values.
    pub fn coerce_arguments(&self, args: &[String]) -> Result<Vec<DynSolValue>, AbiError> {
        let inputs = &self.function.inputs;
        if inputs.len() != args.len() {
            return Err(AbiError::ArgumentCount {
                expected: inputs.len(),
                actual: args.len(),
            });
        }

        inputs
            .iter()
            .zip(args)
            .enumerate()
            .map(|(index, (param, raw))| {
                let invalid = |reason: String| AbiError::InvalidArgument {
                    index,
                    name: param.name.clone(),
                    reason,
                };
                let ty = DynSolType::parse(&param.ty).map_err(|e| invalid(e.to_string()))?;
                ty.coerce_str(raw.trim()).map_err(|e| invalid(e.to_string()))
            })
            .collect()
    }

    /// Selector-prefixed calldata.
    pub fn encode_call(&self, args: &[String]) -> Result<Vec<u8>, AbiError> {
        let values = self.coerce_arguments(args)?;
        self.function
            .abi_encode_input(&values)
            .map_err(|e| AbiError::Encoding(e.to_string()))
    }
}

/// Keccak-256 over the tightly packed encoding of `values`, 0x-prefixed.
///
/// Matches `solidityKeccak256` as used by wallet libraries for
/// `eth_personalSign` payloads.
pub fn solidity_keccak256(types: &[&str], values: &[String]) -> Result<String, AbiError> {
    if types.len() != values.len() {
        return Err(AbiError::ArgumentCount {
            expected: types.len(),
            actual: values.len(),
        });
    }

    let mut packed = Vec::new();
    for (index, (ty, raw)) in types.iter().zip(values).enumerate() {
        let invalid = |reason: String| AbiError::InvalidArgument {
            index,
            name: (*ty).to_string(),
            reason,
        };
        let ty = DynSolType::parse(ty).map_err(|e| invalid(e.to_string()))?;
        let value = ty.coerce_str(raw.trim()).map_err(|e| invalid(e.to_string()))?;
        packed.extend_from_slice(&value.abi_encode_packed());
    }

    Ok(format!("{:#x}", keccak256(&packed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn transfer_calldata_has_erc20_selector() {
        let sig = FunctionSignature::parse("transfer(address to,uint256 value)").unwrap();
        assert_eq!(sig.name(), "transfer");
        assert_eq!(sig.canonical(), "transfer(address,uint256)");

        let data = sig
            .encode_call(&[ALICE.to_string(), "1000".to_string()])
            .unwrap();
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 32 * 2);
        assert_eq!(data[4 + 32 + 31], 0xe8);
    }

    #[test]
    fn argument_names_and_types_are_listed() {
        let sig = FunctionSignature::parse("approveAndCall(address spender,uint256 value,bytes extraData)")
            .unwrap();
        let args = sig.arguments();
        assert_eq!(args.len(), 3);
        assert_eq!(args[2].name, "extraData");
        assert_eq!(args[2].ty, "bytes");
    }

    #[test]
    fn wrong_argument_count_is_rejected() {
        let sig = FunctionSignature::parse("transfer(address to,uint256 value)").unwrap();
        assert_eq!(
            sig.encode_call(&[ALICE.to_string()]),
            Err(AbiError::ArgumentCount {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn malformed_argument_is_rejected() {
        let sig = FunctionSignature::parse("transfer(address to,uint256 value)").unwrap();
        let err = sig
            .encode_call(&["0x1234".to_string(), "1".to_string()])
            .unwrap_err();
        assert!(matches!(err, AbiError::InvalidArgument { index: 0, .. }));
    }

    #[test]
    fn packed_hash_of_single_uint() {
        // keccak256(uint256(1))
        let hash = solidity_keccak256(&["uint256"], &["1".to_string()]).unwrap();
        assert_eq!(
            hash,
            "0xb10e2d527612073b26eecdfd717e6a320cf44b4afac2b0732d9fcbe2b7fa0cf6"
        );
    }

    #[test]
    fn packed_hash_depends_on_every_value() {
        let types = ["address", "uint256"];
        let a = solidity_keccak256(&types, &[ALICE.to_string(), "1".to_string()]).unwrap();
        let b = solidity_keccak256(&types, &[ALICE.to_string(), "2".to_string()]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 66);
    }
}
