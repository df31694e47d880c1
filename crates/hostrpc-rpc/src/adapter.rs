//! Request decoding and argument kind detection.
//!
//! Turns one JSON value of a (possibly batched) message into a
//! [`Request`], classifying every positional argument into a
//! [`ParamKind`] so that dispatch can pick an overload.

use hostrpc_registry::ParamKind;
use serde_json::{Map, Value};

use crate::errors::RpcError;
use crate::types::{JSONRPC_VERSION, Request, RequestId};

/// A request that failed to decode, with the id recovered so far.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeError {
    /// Id to answer with.
    pub id: RequestId,
    /// What was wrong.
    pub error: RpcError,
}

impl DecodeError {
    fn new(id: &RequestId, error: RpcError) -> Self {
        Self {
            id: id.clone(),
            error,
        }
    }
}

/// Decode one request object.
pub fn decode_request(value: &Value) -> Result<Request, DecodeError> {
    let Value::Object(object) = value else {
        return Err(DecodeError::new(
            &RequestId::Null,
            RpcError::invalid_request("request should be JSON object."),
        ));
    };

    let id = decode_id(object)?;
    let echo = id.clone().unwrap_or_default();

    match object.get("jsonrpc") {
        None => {
            return Err(DecodeError::new(
                &echo,
                RpcError::invalid_request("'jsonrpc' property is missing."),
            ));
        }
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(Value::String(v)) => {
            return Err(DecodeError::new(
                &echo,
                RpcError::invalid_request(format!("'jsonrpc' version '{v}' is not supported.")),
            ));
        }
        Some(_) => {
            return Err(DecodeError::new(
                &echo,
                RpcError::invalid_request("'jsonrpc' property should be string."),
            ));
        }
    }

    let method = match object.get("method") {
        None => {
            return Err(DecodeError::new(
                &echo,
                RpcError::invalid_request("'method' property is missing."),
            ));
        }
        Some(Value::String(m)) => m.clone(),
        Some(_) => {
            return Err(DecodeError::new(
                &echo,
                RpcError::invalid_request("'method' property should be string."),
            ));
        }
    };

    let (params, kinds) =
        decode_params(object.get("params")).map_err(|error| DecodeError::new(&echo, error))?;

    Ok(Request {
        id,
        method,
        params,
        kinds,
    })
}

fn decode_id(object: &Map<String, Value>) -> Result<Option<RequestId>, DecodeError> {
    match object.get("id") {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(RequestId::Null)),
        Some(Value::Number(n)) => Ok(Some(RequestId::Number(n.clone()))),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s.clone()))),
        Some(_) => Err(DecodeError::new(
            &RequestId::Null,
            RpcError::invalid_request("'id' property should be string, number or null."),
        )),
    }
}

/// Split `params` into positional arguments and their kinds.
pub fn decode_params(params: Option<&Value>) -> Result<(Vec<Value>, Vec<ParamKind>), RpcError> {
    match params {
        None | Some(Value::Null) => Ok((Vec::new(), Vec::new())),
        Some(Value::Array(items)) if items.is_empty() => {
            Err(RpcError::invalid_params("'params' property is empty array."))
        }
        Some(Value::Array(items)) => {
            let kinds = items.iter().map(element_kind).collect::<Result<Vec<_>, _>>()?;
            Ok((items.clone(), kinds))
        }
        Some(Value::Object(map)) if map.is_empty() => {
            Err(RpcError::invalid_params("'params' property is empty object."))
        }
        Some(object @ Value::Object(_)) => Ok((vec![object.clone()], vec![ParamKind::Object])),
        Some(_) => Err(RpcError::invalid_params(
            "'params' property should be array or object.",
        )),
    }
}

/// Positional arguments taken from inside a lone array argument.
///
/// Some clients wrap the whole argument list in one array (`[[1, 2]]`).
/// Returns `None` unless `params` is exactly one non-empty array.
pub fn unwrap_single_array(
    params: &[Value],
) -> Option<Result<(Vec<Value>, Vec<ParamKind>), RpcError>> {
    let [Value::Array(inner)] = params else {
        return None;
    };
    if inner.is_empty() {
        return None;
    }
    Some(
        inner
            .iter()
            .map(element_kind)
            .collect::<Result<Vec<_>, _>>()
            .map(|kinds| (inner.clone(), kinds)),
    )
}

/// Kind of one positional argument.
pub fn element_kind(value: &Value) -> Result<ParamKind, RpcError> {
    Ok(match value {
        Value::Bool(_) => ParamKind::Boolean,
        Value::Number(_) => ParamKind::Number,
        Value::String(_) => ParamKind::String,
        Value::Null | Value::Object(_) => ParamKind::Object,
        Value::Array(items) => array_kind(items)?,
    })
}

fn array_kind(items: &[Value]) -> Result<ParamKind, RpcError> {
    let Some(first) = items.first() else {
        return Ok(ParamKind::ObjectArray);
    };
    let mut kind = scalar_kind(first)?;
    for item in &items[1..] {
        if scalar_kind(item)? != kind {
            kind = ParamKind::Object;
        }
    }
    Ok(kind.array_kind().unwrap_or(ParamKind::ObjectArray))
}

fn scalar_kind(value: &Value) -> Result<ParamKind, RpcError> {
    match value {
        Value::Array(_) => Err(RpcError::invalid_params(
            "nested arrays are not supported in 'params'.",
        )),
        other => element_kind(other),
    }
}
