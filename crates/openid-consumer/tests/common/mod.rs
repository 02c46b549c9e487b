//! Common test utilities for verification tests
//!
//! Provides canned OP/RP identities, signed response builders, scripted
//! collaborators and log capture.

#![allow(dead_code)]

use async_trait::async_trait;
use openid_consumer::endpoint::{DiscoveryError, OPENID_1_1_TYPE, OPENID_2_0_TYPE};
use openid_consumer::{
    Association, AssociationType, Discoverer, KvPoster, ServiceEndpoint, TransportError, make_nonce,
};
use openid_message::{Message, OPENID2_NS};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

pub const OP_URL: &str = "https://op.example.com/server";
pub const CLAIMED_ID: &str = "https://alice.example.com/";
pub const LOCAL_ID: &str = "https://op.example.com/u/alice";
pub const RETURN_TO: &str = "https://rp.example.com/finish";
pub const HANDLE: &str = "assoc-1";

/// Association shared between the test OP and the RP store
pub fn association() -> Association {
    Association::from_expires_in(
        HANDLE,
        b"0123456789abcdef0123456789abcdef".to_vec(),
        std::time::Duration::from_secs(600),
        AssociationType::HmacSha256,
    )
}

/// Association that has already expired
pub fn expired_association() -> Association {
    Association::from_expires_in(
        HANDLE,
        b"0123456789abcdef0123456789abcdef".to_vec(),
        std::time::Duration::ZERO,
        AssociationType::HmacSha256,
    )
}

/// OpenID 2 endpoint for Alice at the test OP
pub fn openid2_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new(
        Some(CLAIMED_ID.to_string()),
        Some(LOCAL_ID.to_string()),
        Some(OP_URL.to_string()),
        vec![OPENID_2_0_TYPE.to_string()],
    )
}

/// OpenID 1.1 endpoint for Alice at the test OP
pub fn openid1_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new(
        Some(CLAIMED_ID.to_string()),
        Some(LOCAL_ID.to_string()),
        Some(OP_URL.to_string()),
        vec![OPENID_1_1_TYPE.to_string()],
    )
}

/// Builder for signed positive assertions
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    openid2: bool,
    return_to: String,
    fields: Vec<(String, String)>,
    bare: Vec<(String, String)>,
    signed: Vec<String>,
}

impl ResponseBuilder {
    /// OpenID 2 assertion for Alice, with a fresh nonce
    pub fn openid2() -> Self {
        let builder = Self {
            openid2: true,
            return_to: RETURN_TO.to_string(),
            fields: Vec::new(),
            bare: Vec::new(),
            signed: Vec::new(),
        };
        builder
            .field("mode", "id_res")
            .signed_field("op_endpoint", OP_URL)
            .signed_field("claimed_id", CLAIMED_ID)
            .signed_field("identity", LOCAL_ID)
            .signed_field("response_nonce", &make_nonce())
    }

    /// OpenID 1 assertion for Alice, with an RP nonce in return_to
    pub fn openid1() -> Self {
        let builder = Self {
            openid2: false,
            return_to: RETURN_TO.to_string(),
            fields: Vec::new(),
            bare: Vec::new(),
            signed: Vec::new(),
        };
        builder
            .field("mode", "id_res")
            .signed_field("identity", LOCAL_ID)
            .return_to_arg("rp_nonce", &make_nonce())
    }

    /// Add an unsigned protocol field
    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.retain(|(k, _)| k != key);
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a protocol field covered by the signature
    pub fn signed_field(mut self, key: &str, value: &str) -> Self {
        if !self.signed.iter().any(|k| k == key) {
            self.signed.push(key.to_string());
        }
        self.field(key, value)
    }

    /// Drop a protocol field (and its signature coverage)
    pub fn without(mut self, key: &str) -> Self {
        self.fields.retain(|(k, _)| k != key);
        self.signed.retain(|k| k != key);
        self
    }

    /// Leave a present field out of the signed list
    pub fn unsigned(mut self, key: &str) -> Self {
        self.signed.retain(|k| k != key);
        self
    }

    /// Add a query argument to return_to and deliver it as a bare parameter
    pub fn return_to_arg(mut self, key: &str, value: &str) -> Self {
        self.bare.push((key.to_string(), value.to_string()));
        self
    }

    fn return_to_url(&self) -> String {
        if self.bare.is_empty() {
            return self.return_to.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.bare.iter())
            .finish();
        format!("{}?{}", self.return_to, query)
    }

    /// Sign with `association` and deliver as post arguments
    pub fn sign(self, association: &Association) -> Message {
        let mut message = self.unsigned_message();
        let mut signed: Vec<&str> = vec!["return_to"];
        signed.extend(self.signed.iter().map(String::as_str));
        association
            .sign_message(&mut message, &signed)
            .expect("test response signs");
        Message::from_post_args(message.to_post_args()).expect("test response reparses")
    }

    /// Message with a bogus signature, for remote verification
    pub fn unsigned_message(&self) -> Message {
        let mut args: Vec<(String, String)> = Vec::new();
        if self.openid2 {
            args.push(("openid.ns".to_string(), OPENID2_NS.to_string()));
        }
        args.push(("openid.return_to".to_string(), self.return_to_url()));
        for (key, value) in &self.fields {
            args.push((format!("openid.{key}"), value.clone()));
        }
        args.extend(self.bare.iter().cloned());
        let mut signed = vec!["return_to".to_string()];
        signed.extend(self.signed.iter().cloned());
        signed.push("assoc_handle".to_string());
        args.push(("openid.assoc_handle".to_string(), HANDLE.to_string()));
        args.push(("openid.signed".to_string(), signed.join(",")));
        args.push(("openid.sig".to_string(), "c2lnbmF0dXJl".to_string()));
        Message::from_post_args(args).expect("test response parses")
    }
}

/// Scripted [`KvPoster`] that records every request
#[derive(Debug, Default)]
pub struct RecordingPoster {
    response: Mutex<Option<Result<Message, TransportError>>>,
    requests: Mutex<Vec<(Message, String)>>,
}

impl RecordingPoster {
    /// Answer every request with `is_valid:true`
    pub fn valid() -> Arc<Self> {
        Self::responding(Ok(Message::from_kv_form(&format!("ns:{OPENID2_NS}\nis_valid:true\n"))
            .expect("kv form parses")))
    }

    /// Answer every request with `body`
    pub fn kv(body: &str) -> Arc<Self> {
        Self::responding(Ok(Message::from_kv_form(body).expect("kv form parses")))
    }

    /// Answer every request with `response`
    pub fn responding(response: Result<Message, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Some(response)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<(Message, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl KvPoster for RecordingPoster {
    async fn post(&self, request: &Message, server_url: &str) -> Result<Message, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), server_url.to_string()));
        self.response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(TransportError::Http("no scripted response".to_string())))
    }
}

/// [`Discoverer`] answering from a fixed table
#[derive(Debug, Default)]
pub struct StaticDiscoverer {
    services: HashMap<String, Vec<ServiceEndpoint>>,
    failure: Option<String>,
    lookups: Mutex<Vec<String>>,
}

impl StaticDiscoverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover `endpoints`, in order, for `identifier`
    pub fn with(mut self, identifier: &str, endpoints: Vec<ServiceEndpoint>) -> Self {
        self.services.insert(identifier.to_string(), endpoints);
        self
    }

    /// Fail every lookup
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Discoverer for StaticDiscoverer {
    async fn discover(&self, identifier: &str) -> Result<Vec<ServiceEndpoint>, DiscoveryError> {
        self.lookups.lock().unwrap().push(identifier.to_string());
        if let Some(reason) = &self.failure {
            return Err(DiscoveryError::Fetch(reason.clone()));
        }
        Ok(self.services.get(identifier).cloned().unwrap_or_default())
    }
}

/// Shared buffer receiving formatted log output
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Capture every log event on the current thread until the guard drops
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
