//! Generated gRPC types plus the `serde_json::Value` <-> `prost_types::Struct`
//! conversions every other module in this crate needs, since the wire
//! contract carries opaque documents as `google.protobuf.Struct` (spec.md §6
//! "Function RPC").

use prost_types::value::Kind;
use prost_types::{ListValue, Struct, Value};
use serde_json::{Map, Value as Json};

use crate::error::{FunctionError, Result};

pub mod generated {
    tonic::include_proto!("apiextensions.fn.v1");
}

pub use generated::{
    function_runner_service_client::FunctionRunnerServiceClient,
    function_runner_service_server::{FunctionRunnerService, FunctionRunnerServiceServer},
    credentials, Credentials, CredentialData, MatchLabels, RequestMeta, Requirements as ProtoRequirements,
    Resource as ProtoResource, ResourceSelector as ProtoResourceSelector, ResponseMeta,
    Result as ProtoResult, RunFunctionRequest, RunFunctionResponse, Severity as ProtoSeverity,
    State as ProtoState, Target as ProtoTarget, resource_selector,
};

/// `Json::Object` is the only shape `google.protobuf.Struct` can represent;
/// anything else is a caller bug, not a runtime condition functions should
/// see.
pub fn json_to_struct(value: &Json) -> Result<Struct> {
    match value {
        Json::Object(map) => Ok(Struct {
            fields: map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect(),
        }),
        Json::Null => Ok(Struct::default()),
        other => Err(FunctionError::InvalidDocument(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

pub fn struct_to_json(s: &Struct) -> Json {
    let map: Map<String, Json> = s.fields.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect();
    Json::Object(map)
}

fn json_to_value(value: &Json) -> Value {
    let kind = match value {
        Json::Null => Kind::NullValue(0),
        Json::Bool(b) => Kind::BoolValue(*b),
        Json::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        Json::String(s) => Kind::StringValue(s.clone()),
        Json::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_value).collect(),
        }),
        Json::Object(map) => Kind::StructValue(Struct {
            fields: map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect(),
        }),
    };
    Value { kind: Some(kind) }
}

fn value_to_json(value: &Value) -> Json {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => Json::Null,
        Some(Kind::BoolValue(b)) => Json::Bool(*b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        Some(Kind::StringValue(s)) => Json::String(s.clone()),
        Some(Kind::ListValue(list)) => Json::Array(list.values.iter().map(value_to_json).collect()),
        Some(Kind::StructValue(s)) => struct_to_json(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn struct_round_trips_nested_document() {
        let doc = json!({"a": 1, "b": {"c": [true, "x", null]}});
        let s = json_to_struct(&doc).unwrap();
        assert_eq!(struct_to_json(&s), doc);
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(json_to_struct(&json!([1, 2])).is_err());
    }
}
