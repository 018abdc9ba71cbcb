//! Request/response envelopes and typed operation payloads.
//!
//! Command and response frames carry a JSON envelope. A [`Request`]
//! names the operation and holds its argument record; a [`Response`]
//! answers exactly one request. Wire keys are lowerCamelCase.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtoError, Result};

/// A command envelope sent to the supervisor.
///
/// The supervisor dispatches on `id`; the frame opcode is not used for
/// routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Operation name, e.g. `"register"`.
    pub id: String,
    /// Operation arguments; absent for operations that take none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// Serializes to the JSON wire form.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(ProtoError::Codec)
    }

    /// Parses from the JSON wire form.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(ProtoError::Codec)
    }
}

/// A reply envelope for exactly one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Peer-supplied failure text; usually set when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Operation-specific result values, keyed by field name.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl Response {
    /// Serializes to the JSON wire form.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(ProtoError::Codec)
    }

    /// Parses from the JSON wire form.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(ProtoError::Codec)
    }
}

/// Arguments for the `register` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVm {
    /// Identifier of the VM being registered.
    pub container_id: String,
    /// Host path of the control serial channel.
    pub ctl_serial: String,
    /// Host path of the I/O serial channel.
    pub io_serial: String,
    /// Host path of the console socket, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<String>,
}

/// Arguments for the `unregister` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterVm {
    /// Identifier of the VM being unregistered.
    pub container_id: String,
}

/// Arguments for the `attach` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attach {
    /// Identifier of the VM to attach to.
    pub container_id: String,
}

/// Arguments for the `allocateIO` operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateIo {
    /// Number of I/O channels requested.
    pub n_streams: u32,
}

/// Arguments for the `hyper` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hyper {
    /// Name of the agent command to forward.
    pub hyper_name: String,
    /// Opaque, caller-defined command body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn register_wire_keys_are_camel_case() {
        let payload = RegisterVm {
            container_id: "vm-1".into(),
            ctl_serial: "/run/ctl.sock".into(),
            io_serial: "/run/io.sock".into(),
            console: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "containerId": "vm-1",
                "ctlSerial": "/run/ctl.sock",
                "ioSerial": "/run/io.sock",
            })
        );
    }

    #[test]
    fn register_console_is_present_when_set() {
        let payload = RegisterVm {
            container_id: "vm-1".into(),
            ctl_serial: "c".into(),
            io_serial: "i".into(),
            console: Some("/run/console.sock".into()),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["console"], "/run/console.sock");
    }

    #[test]
    fn allocate_io_and_hyper_wire_keys() {
        let value = serde_json::to_value(AllocateIo { n_streams: 4 }).unwrap();
        assert_eq!(value, json!({"nStreams": 4}));

        let value = serde_json::to_value(Hyper {
            hyper_name: "ping".into(),
            data: None,
        })
        .unwrap();
        assert_eq!(value, json!({"hyperName": "ping"}));
    }

    #[test]
    fn request_omits_absent_data() {
        let req = Request {
            id: "unregister".into(),
            data: None,
        };
        let bytes = req.to_vec().unwrap();
        assert_eq!(bytes, br#"{"id":"unregister"}"#);
    }

    #[test]
    fn response_defaults_for_missing_fields() {
        let resp = Response::from_slice(br#"{"success":true}"#).unwrap();
        assert!(resp.success);
        assert!(resp.error.is_none());
        assert!(resp.data.is_empty());
    }

    #[test]
    fn response_carries_error_text() {
        let resp = Response::from_slice(br#"{"success":false,"error":"busy"}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("busy"));
    }
}
