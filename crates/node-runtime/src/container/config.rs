//! # Node Configuration
//!
//! Configuration of the networking node: identity, forwarding defaults, the
//! signature policy and the OCPP actions served by a pipeline.
//!
//! ## Loading Order
//!
//! 1. Built-in defaults
//! 2. JSON file named by `NN_CONFIG` (camelCase keys, every section optional)
//! 3. Environment overrides: `NN_NODE_ID`, `NN_DEFAULT_FORWARDING`,
//!    `NN_DEFAULT_VERIFICATION`, `NN_FILTER_TIMEOUT_MS`
//!
//! Key material is stored as base64 (`privateKey`, `publicKey`) next to its `curve`.

use chrono::Utc;
use nn_01_signature_policy::{
    KeyMaterial, SignatureAction, SignaturePolicy, SignaturePolicyError, SigningCurve,
    SigningIdentity, VerificationAction,
};
use nn_02_forwarding::{ForwardingConfig, ForwardingError, ForwardingResult, DEFAULT_LOG_MESSAGE};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "NN_CONFIG";
pub const NODE_ID_ENV: &str = "NN_NODE_ID";
pub const DEFAULT_FORWARDING_ENV: &str = "NN_DEFAULT_FORWARDING";
pub const DEFAULT_VERIFICATION_ENV: &str = "NN_DEFAULT_VERIFICATION";
pub const FILTER_TIMEOUT_ENV: &str = "NN_FILTER_TIMEOUT_MS";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid key for {context}: {source}")]
    Key {
        context: String,
        #[source]
        source: SignaturePolicyError,
    },

    #[error("Invalid signature policy: {0}")]
    Policy(#[from] SignaturePolicyError),

    #[error("Invalid forwarding configuration: {0}")]
    Forwarding(#[from] ForwardingError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// NODE
// =============================================================================

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    /// Identity of this node in the overlay network.
    pub node_id: String,
    pub forwarding: ForwardingSettings,
    pub signatures: SignatureSettings,
    /// Actions served by a forwarding pipeline. Others follow `forwarding.defaultResult`.
    pub operations: Vec<OperationConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "networking-node".to_string(),
            forwarding: ForwardingSettings::default(),
            signatures: SignatureSettings::default(),
            operations: [
                "Authorize",
                "BootNotification",
                "Heartbeat",
                "MeterValues",
                "StatusNotification",
                "TransactionEvent",
            ]
            .into_iter()
            .map(OperationConfig::new)
            .collect(),
        }
    }
}

impl NodeConfig {
    /// Defaults, then the file named by `NN_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        info!(path = %path.display(), "Loaded node configuration");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(node_id) = lookup(NODE_ID_ENV) {
            debug!(node_id = %node_id, "Node id overridden from environment");
            self.node_id = node_id;
        }
        if let Some(value) = lookup(DEFAULT_FORWARDING_ENV) {
            self.forwarding.default_result = value
                .parse::<ForwardingResult>()
                .map_err(|reason| invalid_env(DEFAULT_FORWARDING_ENV, &value, reason))?;
        }
        if let Some(value) = lookup(DEFAULT_VERIFICATION_ENV) {
            self.signatures.default_verification_action = value
                .parse::<VerificationAction>()
                .map_err(|reason| invalid_env(DEFAULT_VERIFICATION_ENV, &value, reason))?;
        }
        if let Some(value) = lookup(FILTER_TIMEOUT_ENV) {
            let millis: u64 = value
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    invalid_env(FILTER_TIMEOUT_ENV, &value, e.to_string())
                })?;
            self.forwarding.filter_timeout_ms = Some(millis);
        }
        Ok(())
    }

    /// Reject configurations the node cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::Invalid("nodeId must not be empty".to_string()));
        }

        self.forwarding_config().validate()?;

        let mut actions = HashSet::new();
        for operation in &self.operations {
            if operation.action.trim().is_empty() {
                return Err(ConfigError::Invalid("operation action must not be empty".to_string()));
            }
            if !actions.insert(operation.action.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "operation {} is configured twice",
                    operation.action
                )));
            }
        }

        self.build_policy().map(|_| ())
    }

    #[must_use]
    pub fn forwarding_config(&self) -> ForwardingConfig {
        ForwardingConfig {
            default_result: self.forwarding.default_result,
            default_log_message: self.forwarding.default_log_message.clone(),
            filter_timeout: self.forwarding.filter_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Decode every configured key and assemble the signature policy.
    pub fn build_policy(&self) -> Result<SignaturePolicy, ConfigError> {
        let settings = &self.signatures;

        let default_identity = settings
            .default_key
            .as_ref()
            .map(|key| key.to_identity("defaultKey"))
            .transpose()?;
        if settings.default_signature_action == SignatureAction::Sign {
            if let Some(identity) = &default_identity {
                require_private_key(identity, "defaultKey")?;
            }
        }

        let mut policy = SignaturePolicy::new(
            settings.default_signature_action,
            settings.default_verification_action,
            default_identity,
        )?;

        for rule in &settings.signing_rules {
            let identity = rule.key.to_identity(&rule.context)?;
            if rule.action == SignatureAction::Sign {
                require_private_key(&identity, &rule.context)?;
            }
            policy.add_signing_rule_with_action(rule.context.clone(), rule.action, identity, rule.priority);
        }
        for rule in &settings.verification_rules {
            policy.add_verification_rule(rule.context.clone(), rule.action, rule.priority);
        }

        Ok(policy)
    }
}

fn invalid_env(name: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn require_private_key(identity: &SigningIdentity, context: &str) -> Result<(), ConfigError> {
    if identity.key().has_private_key() {
        return Ok(());
    }
    Err(ConfigError::Key {
        context: context.to_string(),
        source: SignaturePolicyError::MissingPrivateKey {
            key_id: identity.key().key_id_base64(),
        },
    })
}

// =============================================================================
// FORWARDING
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForwardingSettings {
    /// `FORWARD` or `REJECT`.
    pub default_result: ForwardingResult,
    pub default_log_message: String,
    /// `null` lets filters run until the request is cancelled.
    pub filter_timeout_ms: Option<u64>,
}

impl Default for ForwardingSettings {
    fn default() -> Self {
        Self {
            default_result: ForwardingResult::Forward,
            default_log_message: DEFAULT_LOG_MESSAGE.to_string(),
            filter_timeout_ms: Some(5_000),
        }
    }
}

/// One OCPP action served by a forwarding pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationConfig {
    pub action: String,
    /// Request context; `<action>Request` when absent.
    #[serde(default)]
    pub context: Option<String>,
    /// Response context; `<action>Response` when absent.
    #[serde(default)]
    pub response_context: Option<String>,
}

impl OperationConfig {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            context: None,
            response_context: None,
        }
    }

    #[must_use]
    pub fn request_context(&self) -> String {
        self.context
            .clone()
            .unwrap_or_else(|| format!("{}Request", self.action))
    }

    #[must_use]
    pub fn response_context(&self) -> String {
        self.response_context
            .clone()
            .unwrap_or_else(|| format!("{}Response", self.action))
    }
}

// =============================================================================
// SIGNATURES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignatureSettings {
    pub default_signature_action: SignatureAction,
    pub default_verification_action: VerificationAction,
    /// Required when `defaultSignatureAction` is `Sign`.
    pub default_key: Option<KeyConfig>,
    pub signing_rules: Vec<SigningRuleConfig>,
    pub verification_rules: Vec<VerificationRuleConfig>,
}

impl Default for SignatureSettings {
    fn default() -> Self {
        Self {
            default_signature_action: SignatureAction::Skip,
            default_verification_action: VerificationAction::AcceptUnverified,
            default_key: None,
            signing_rules: Vec::new(),
            verification_rules: Vec::new(),
        }
    }
}

/// Stored key pair plus the metadata attached to every signature it makes.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyConfig {
    pub curve: SigningCurve,
    /// Base64 of the SEC1 or PKCS#8 DER private key. Absent for verification-only keys.
    #[serde(default)]
    pub private_key: Option<String>,
    /// Base64 of the SEC1 point or SPKI DER public key.
    pub public_key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Stamp every signature with the signing time.
    #[serde(default)]
    pub timestamp: bool,
}

impl KeyConfig {
    pub fn to_identity(&self, context: &str) -> Result<SigningIdentity, ConfigError> {
        let key = KeyMaterial::from_base64(self.curve, self.private_key.as_deref(), &self.public_key)
            .map_err(|source| ConfigError::Key {
                context: context.to_string(),
                source,
            })?;

        let mut identity = SigningIdentity::new(key);
        if let Some(name) = self.name.clone() {
            identity = identity.with_name(move |_| name.clone());
        }
        if let Some(description) = self.description.clone() {
            identity = identity.with_description(move |_| description.clone());
        }
        if self.timestamp {
            identity = identity.with_timestamp(|_| Utc::now());
        }
        Ok(identity)
    }
}

impl std::fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyConfig")
            .field("curve", &self.curve)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("public_key", &self.public_key)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRuleConfig {
    pub context: String,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default = "default_rule_action")]
    pub action: SignatureAction,
    pub key: KeyConfig,
}

fn default_rule_action() -> SignatureAction {
    SignatureAction::Sign
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRuleConfig {
    pub context: String,
    #[serde(default)]
    pub priority: Option<u32>,
    pub action: VerificationAction,
}
