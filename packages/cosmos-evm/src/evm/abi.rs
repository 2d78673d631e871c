//! ABI packing of contract calls and deployments.

use alloy::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy::json_abi::{JsonAbi, Param};
use serde_json::Value;

use crate::error::{Error, Result};

/// Load an ABI from either a bare JSON array or a compiler artifact with an `abi` field.
pub fn load_abi(value: &Value) -> Result<JsonAbi> {
    let abi = match value {
        Value::Object(artifact) => artifact.get("abi").unwrap_or(value),
        _ => value,
    };
    serde_json::from_value(abi.clone()).map_err(|e| Error::unmarshal("contract ABI", e))
}

fn coerce_args(inputs: &[Param], args: &[String]) -> Result<Vec<DynSolValue>> {
    inputs
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty: DynSolType = param
                .resolve()
                .map_err(|e| Error::parse("ABI parameter type", e))?;
            ty.coerce_str(arg).map_err(|e| {
                Error::parse(
                    "ABI argument",
                    format!("{arg:?} is not a valid {}: {e}", param.ty),
                )
            })
        })
        .collect()
}

/// Selector plus encoded arguments for calling `method`.
///
/// Overloads are told apart by argument count, and then by which one accepts the arguments.
pub fn encode_call(abi: &Value, method: &str, args: &[String]) -> Result<Vec<u8>> {
    let abi = load_abi(abi)?;
    let candidates = abi
        .function(method)
        .ok_or_else(|| Error::InvalidRequest(format!("ABI has no function named {method:?}")))?;

    let mut last_error = None;
    for function in candidates.iter().filter(|f| f.inputs.len() == args.len()) {
        match coerce_args(&function.inputs, args) {
            Ok(values) => {
                return function
                    .abi_encode_input(&values)
                    .map_err(|e| Error::marshal("contract call", e));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        Error::InvalidRequest(format!(
            "No overload of {method:?} takes {} arguments",
            args.len()
        ))
    }))
}

/// Contract bytecode followed by the encoded constructor arguments.
pub fn encode_deploy(abi: &Value, bytecode: &str, args: &[String]) -> Result<Vec<u8>> {
    let mut code = hex::decode(bytecode.trim().trim_start_matches("0x"))
        .map_err(|e| Error::parse("contract bytecode", e))?;
    if code.is_empty() {
        return Err(Error::InvalidRequest("Contract bytecode is empty".to_owned()));
    }

    let abi = load_abi(abi)?;
    match abi.constructor() {
        Some(constructor) => {
            if constructor.inputs.len() != args.len() {
                return Err(Error::InvalidRequest(format!(
                    "Constructor takes {} arguments, {} given",
                    constructor.inputs.len(),
                    args.len()
                )));
            }
            let values = coerce_args(&constructor.inputs, args)?;
            code.extend(
                constructor
                    .abi_encode_input(&values)
                    .map_err(|e| Error::marshal("constructor arguments", e))?,
            );
        }
        None if !args.is_empty() => {
            return Err(Error::InvalidRequest(
                "ABI has no constructor but constructor arguments were given".to_owned(),
            ))
        }
        None => (),
    }
    Ok(code)
}
