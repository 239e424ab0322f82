//! An in-process stand-in for the CAdES plugin host.
//!
//! Speaks the wire protocol over a `DuplexChannelTransport` and implements just
//! enough of the store, certificate, hash and signing objects for the signing
//! pipeline. Every call is recorded so tests can check order and resource use.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use cadesign::constants::CADESCOM_BASE64_TO_BINARY;
use cadesign::constants::prog_id;
use nmrpc::ObjectDescriptor;
use nmrpc::ObjectId;
use nmrpc::Operation;
use nmrpc::Param;
use nmrpc::Request;
use nmrpc::Response;
use nmrpc::WireValue;
use nmrun::Bridge;
use nmrun::BridgeConfig;
use nmrun::Transport;
use nmrun::mock_transport::DuplexChannelTransport;

const TAB: u64 = 1;
const ROOT: u64 = 1;

pub const OID_GOST_2012_256: &str = "1.2.643.7.1.1.1.1";
pub const OID_GOST_2012_512: &str = "1.2.643.7.1.1.1.2";
pub const OID_RSA: &str = "1.2.840.113549.1.1.1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic test payload.
pub fn data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// The signature the host produces for `data` hashed with `algorithm`.
///
/// Order-sensitive, so windows fed out of order give a different signature.
pub fn signature_bytes(thumbprint: &str, algorithm: i64, data: &[u8]) -> Vec<u8> {
    let checksum = data.iter().fold(17u64, |acc, &b| acc.wrapping_mul(31).wrapping_add(b as u64));
    format!("{}|{}|{}|{:016x}", thumbprint, algorithm, data.len(), checksum).into_bytes()
}

// ============================================================================
//  CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct FakeCert {
    pub thumbprint: String,
    pub subject: String,
    pub has_private_key: bool,
    /// `None`: reading the public key fails.
    pub oid: Option<String>,
    /// Every property read fails.
    pub unreadable: bool,
}

impl FakeCert {
    pub fn new(thumbprint: &str, subject: &str, oid: &str) -> Self {
        Self {
            thumbprint: thumbprint.into(),
            subject: subject.into(),
            has_private_key: true,
            oid: Some(oid.into()),
            unreadable: false,
        }
    }

    pub fn without_private_key(mut self) -> Self {
        self.has_private_key = false;
        self
    }

    pub fn with_broken_key(mut self) -> Self {
        self.oid = None;
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    pub certificates: Vec<FakeCert>,
    /// `SignHash` fails with this message.
    pub sign_error: Option<String>,
    /// `VerifyHash` fails with this message.
    pub verify_error: Option<String>,
    /// `Store.Close` fails.
    pub fail_close: bool,
    /// `Hash` stops answering once this many windows were fed.
    pub stall_hash_after: Option<usize>,
    /// `SignHash` answers only after this long, like a PIN prompt.
    pub sign_delay: Option<Duration>,
}

impl HostConfig {
    pub fn with_certificates(certificates: Vec<FakeCert>) -> Self {
        Self { certificates, ..Self::default() }
    }
}

// ============================================================================
//  RECORDED STATE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct HashRecord {
    pub algorithm: Option<i64>,
    pub encoding: Option<i64>,
    pub chunks: Vec<Vec<u8>>,
}

impl HashRecord {
    pub fn digested(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

#[derive(Debug, Default)]
pub struct HostState {
    /// `Kind.Member` for every call, in arrival order.
    pub log: Vec<String>,
    pub opens: usize,
    pub closes: usize,
    pub hashes: Vec<HashRecord>,
    pub signatures: Vec<String>,
}

impl HostState {
    pub fn open_stores(&self) -> i64 {
        self.opens as i64 - self.closes as i64
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.log.iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log.iter().filter(|e| *e == entry).count()
    }
}

pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    /// Starts the host and returns a bridge connected to it.
    pub fn start(config: HostConfig) -> (Bridge, FakeHost) {
        Self::start_with(config, BridgeConfig::default())
    }

    pub fn start_with(config: HostConfig, bridge_config: BridgeConfig) -> (Bridge, FakeHost) {
        let (page, plugin) = DuplexChannelTransport::pair();
        let state = Arc::new(Mutex::new(HostState::default()));
        let mut host = Host {
            config,
            objects: HashMap::from([(ROOT, Obj::Root)]),
            next_id: ROOT + 1,
            state: state.clone(),
        };

        tokio::spawn(async move {
            while let Ok(Some(delivery)) = plugin.recv().await {
                let Ok(request) = Request::decode(&delivery.payload) else { continue };
                let delay = host.config.sign_delay.filter(|_| is_sign_hash(&request));
                if let Some(response) = host.handle(&request) {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    let Ok(bytes) = response.encode(TAB) else { continue };
                    if plugin.send(&bytes).await.is_err() {
                        break;
                    }
                }
            }
        });

        (Bridge::new(bridge_config, Box::new(page)), FakeHost { state })
    }

    pub fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }
}

// ============================================================================
//  HOST
// ============================================================================

fn is_sign_hash(request: &Request) -> bool {
    matches!(&request.operation, Operation::CallMethod { name, .. } if name == "SignHash")
}

#[derive(Debug, Clone)]
enum Obj {
    Root,
    Store { open: bool },
    Collection(Vec<usize>),
    Cert(usize),
    PublicKey(usize),
    Algorithm(usize),
    HashedData(usize),
    Signer { certificate: Option<usize>, check: bool },
    SignedData,
}

impl Obj {
    fn kind(&self) -> &'static str {
        match self {
            Obj::Root => "Plugin",
            Obj::Store { .. } => "Store",
            Obj::Collection(_) => "Certificates",
            Obj::Cert(_) => "Certificate",
            Obj::PublicKey(_) => "PublicKey",
            Obj::Algorithm(_) => "Algorithm",
            Obj::HashedData(_) => "HashedData",
            Obj::Signer { .. } => "Signer",
            Obj::SignedData => "SignedData",
        }
    }

    fn members(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            Obj::Root => (&[], &["CreateObject"]),
            Obj::Store { .. } => (&["Certificates", "Location", "Name"], &["Open", "Close"]),
            Obj::Collection(_) => (&["Count"], &["Item", "Find"]),
            Obj::Cert(_) => (
                &["SubjectName", "Thumbprint", "SerialNumber", "ValidFromDate", "ValidToDate"],
                &["HasPrivateKey", "PublicKey", "IsValid"],
            ),
            Obj::PublicKey(_) => (&["Algorithm", "Length"], &[]),
            Obj::Algorithm(_) => (&["Value", "FriendlyName"], &[]),
            Obj::HashedData(_) => (&["Algorithm", "DataEncoding", "Value"], &["Hash", "SetHashValue"]),
            Obj::Signer { .. } => (&["Certificate", "CheckCertificate", "Options", "TSAAddress"], &[]),
            Obj::SignedData => (&["ContentEncoding", "Content"], &["SignHash", "VerifyHash", "SignCades"]),
        }
    }
}

/// `Ok(None)` means "never answer".
type Outcome = Result<Option<WireValue>, String>;

struct Host {
    config: HostConfig,
    objects: HashMap<u64, Obj>,
    next_id: u64,
    state: Arc<Mutex<HostState>>,
}

impl Host {
    fn handle(&mut self, request: &Request) -> Option<Response> {
        let id = request.request_id;
        let outcome = match &request.operation {
            Operation::Init { .. } => return Some(Response::bare(id, json!(ROOT))),
            Operation::Reset { .. } => {
                self.objects.retain(|k, _| *k == ROOT);
                return Some(Response::bare(id, json!(0)));
            }
            operation => match request.object {
                Some(target) => self.dispatch(target.0, operation),
                None => Err("missing objid".into()),
            },
        };
        match outcome {
            Ok(Some(value)) => Some(Response::result(id, value)),
            Ok(None) => None,
            Err(message) => Some(Response::error(id, message)),
        }
    }

    fn create(&mut self, obj: Obj) -> WireValue {
        let id = self.next_id;
        self.next_id += 1;
        let (properties, methods) = obj.members();
        self.objects.insert(id, obj);
        WireValue::object(&ObjectDescriptor {
            id: ObjectId(id),
            properties: properties.iter().map(|s| s.to_string()).collect(),
            methods: methods.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }

    fn cert(&self, index: usize) -> Result<&FakeCert, String> {
        let cert = &self.config.certificates[index];
        if cert.unreadable {
            return Err("0x80092004: cannot read certificate property".into());
        }
        Ok(cert)
    }

    fn lookup(&self, param: Option<&Param>) -> Result<Obj, String> {
        let id = param.and_then(Param::as_object).ok_or("expected object argument")?;
        self.objects.get(&id.0).cloned().ok_or_else(|| format!("unknown object {}", id))
    }

    fn signature_for(&self, record: usize, certificate: usize) -> String {
        let state = self.state();
        let record = &state.hashes[record];
        let bytes = signature_bytes(
            &self.config.certificates[certificate].thumbprint,
            record.algorithm.unwrap_or(-1),
            &record.digested(),
        );
        // The plugin wraps base64 output at 64 columns.
        let text = STANDARD.encode(bytes);
        text.as_bytes()
            .chunks(64)
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    fn dispatch(&mut self, target: u64, operation: &Operation) -> Outcome {
        let obj = self.objects.get(&target).cloned().ok_or_else(|| format!("unknown object {}", target))?;
        let member = match operation {
            Operation::CallMethod { name, .. } | Operation::GetProperty { name } | Operation::SetProperty { name, .. } => name.as_str(),
            _ => "",
        };
        self.state().log.push(format!("{}.{}", obj.kind(), member));

        let none = || -> Outcome { Ok(Some(WireValue::none())) };

        match (obj, operation) {
            (Obj::Root, Operation::CallMethod { name, params }) if name == "CreateObject" => {
                let created = match params.first().and_then(Param::as_str) {
                    Some(prog_id::STORE) => Obj::Store { open: false },
                    Some(prog_id::HASHED_DATA) => {
                        let mut state = self.state();
                        state.hashes.push(HashRecord::default());
                        Obj::HashedData(state.hashes.len() - 1)
                    }
                    Some(prog_id::CP_SIGNER) => Obj::Signer { certificate: None, check: false },
                    Some(prog_id::CADES_SIGNED_DATA) => Obj::SignedData,
                    other => return Err(format!("Invalid ProgID {:?}", other)),
                };
                Ok(Some(self.create(created)))
            }

            (Obj::Store { .. }, Operation::CallMethod { name, .. }) if name == "Open" => {
                self.objects.insert(target, Obj::Store { open: true });
                self.state().opens += 1;
                none()
            }
            (Obj::Store { open }, Operation::GetProperty { name }) if name == "Certificates" => {
                if !open {
                    return Err("store is not open".into());
                }
                let all = (0..self.config.certificates.len()).collect();
                Ok(Some(self.create(Obj::Collection(all))))
            }
            (Obj::Store { .. }, Operation::CallMethod { name, .. }) if name == "Close" => {
                self.objects.insert(target, Obj::Store { open: false });
                self.state().closes += 1;
                if self.config.fail_close {
                    return Err("0x80070006: invalid handle".into());
                }
                none()
            }

            (Obj::Collection(items), Operation::GetProperty { name }) if name == "Count" => {
                Ok(Some(WireValue::number(items.len() as i64)))
            }
            (Obj::Collection(items), Operation::CallMethod { name, params }) if name == "Item" => {
                let index = params.first().and_then(Param::as_i64).ok_or("expected index")?;
                let cert = usize::try_from(index - 1).ok().and_then(|i| items.get(i).copied()).ok_or("Invalid index")?;
                Ok(Some(self.create(Obj::Cert(cert))))
            }
            (Obj::Collection(items), Operation::CallMethod { name, params }) if name == "Find" => {
                let find_type = params.first().and_then(Param::as_i64).ok_or("expected find type")?;
                let criterion = params.get(1).and_then(Param::as_str).ok_or("expected criterion")?.to_string();
                let certs = &self.config.certificates;
                let found = items
                    .into_iter()
                    .filter(|&i| match find_type {
                        0 => certs[i].thumbprint.eq_ignore_ascii_case(&criterion),
                        1 => certs[i].subject.contains(&criterion),
                        _ => false,
                    })
                    .collect();
                Ok(Some(self.create(Obj::Collection(found))))
            }

            (Obj::Cert(i), Operation::CallMethod { name, .. }) if name == "HasPrivateKey" => {
                Ok(Some(WireValue::boolean(self.cert(i)?.has_private_key)))
            }
            (Obj::Cert(i), Operation::GetProperty { name }) if name == "SubjectName" => {
                Ok(Some(WireValue::string(self.cert(i)?.subject.clone())))
            }
            (Obj::Cert(i), Operation::GetProperty { name }) if name == "Thumbprint" => {
                Ok(Some(WireValue::string(self.cert(i)?.thumbprint.clone())))
            }
            (Obj::Cert(i), Operation::CallMethod { name, .. }) if name == "PublicKey" => {
                if self.cert(i)?.oid.is_none() {
                    return Err("0x8009000D: key not available".into());
                }
                Ok(Some(self.create(Obj::PublicKey(i))))
            }
            (Obj::PublicKey(i), Operation::GetProperty { name }) if name == "Algorithm" => {
                Ok(Some(self.create(Obj::Algorithm(i))))
            }
            (Obj::Algorithm(i), Operation::GetProperty { name }) if name == "Value" => {
                Ok(Some(WireValue::string(self.config.certificates[i].oid.clone().unwrap_or_default())))
            }

            (Obj::HashedData(h), Operation::SetProperty { name, value }) => {
                let mut state = self.state();
                let record = &mut state.hashes[h];
                match name.as_str() {
                    "Algorithm" => record.algorithm = value.as_i64(),
                    "DataEncoding" => record.encoding = value.as_i64(),
                    other => return Err(format!("read-only property {}", other)),
                }
                none()
            }
            (Obj::HashedData(h), Operation::CallMethod { name, params }) if name == "Hash" => {
                let text = params.first().and_then(Param::as_str).ok_or("expected data")?;
                let mut state = self.state();
                let fed = state.hashes[h].chunks.len();
                if self.config.stall_hash_after.is_some_and(|n| fed >= n) {
                    return Ok(None);
                }
                let record = &mut state.hashes[h];
                let chunk = if record.encoding == Some(CADESCOM_BASE64_TO_BINARY) {
                    STANDARD.decode(text).map_err(|e| e.to_string())?
                } else {
                    text.as_bytes().to_vec()
                };
                record.chunks.push(chunk);
                none()
            }

            (Obj::Signer { check, .. }, Operation::SetProperty { name, value }) if name == "Certificate" => {
                let Obj::Cert(i) = self.lookup(Some(value))? else {
                    return Err("not a certificate".into());
                };
                self.objects.insert(target, Obj::Signer { certificate: Some(i), check });
                none()
            }
            (Obj::Signer { certificate, .. }, Operation::SetProperty { name, value }) if name == "CheckCertificate" => {
                let check = value.value.as_bool().ok_or("expected boolean")?;
                self.objects.insert(target, Obj::Signer { certificate, check });
                none()
            }

            (Obj::SignedData, Operation::SetProperty { name, .. }) if name == "ContentEncoding" => none(),
            (Obj::SignedData, Operation::CallMethod { name, params }) if name == "SignHash" => {
                if let Some(message) = &self.config.sign_error {
                    return Err(message.clone());
                }
                let Obj::HashedData(h) = self.lookup(params.first())? else {
                    return Err("not a hash".into());
                };
                let Obj::Signer { certificate: Some(c), check: true } = self.lookup(params.get(1))? else {
                    return Err("signer is not configured".into());
                };
                let signature = self.signature_for(h, c);
                self.state().signatures.push(signature.clone());
                Ok(Some(WireValue::string(signature)))
            }
            (Obj::SignedData, Operation::CallMethod { name, params }) if name == "VerifyHash" => {
                if let Some(message) = &self.config.verify_error {
                    return Err(message.clone());
                }
                let Obj::HashedData(_) = self.lookup(params.first())? else {
                    return Err("not a hash".into());
                };
                let signature = params.get(1).and_then(Param::as_str).ok_or("expected signature")?;
                if !self.state().signatures.iter().any(|s| s == signature) {
                    return Err("0x8009100E: signature does not match".into());
                }
                none()
            }

            (obj, operation) => Err(format!("{} does not support {}", obj.kind(), operation.label())),
        }
    }
}
