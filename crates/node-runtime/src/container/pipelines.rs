//! # Pipeline Container
//!
//! Holds the signature policy, the pipelines and the dispatcher of a running
//! node.
//!
//! ## Thread Safety
//!
//! - The policy is immutable once built and shared by `Arc`.
//! - Pipelines are shared by `Arc` between the dispatcher and callers that
//!   register filters and observers; their registries lock internally.

use std::collections::BTreeMap;
use std::sync::Arc;

use nn_01_signature_policy::SignaturePolicy;
use nn_02_forwarding::{ForwardingDispatcher, ForwardingHandler, ForwardingPipeline};
use tracing::{info, instrument};

use crate::adapters::JsonMessageOperation;
use crate::container::config::{ConfigError, NodeConfig};

/// Pipeline of one pass-through JSON operation.
pub type JsonPipeline = ForwardingPipeline<JsonMessageOperation>;

/// Every component of a configured node.
pub struct NodeContainer {
    pub config: NodeConfig,
    policy: Arc<SignaturePolicy>,
    pipelines: BTreeMap<String, Arc<JsonPipeline>>,
    dispatcher: ForwardingDispatcher,
}

impl NodeContainer {
    /// Validate `config` and build the node from it.
    #[instrument(skip(config), fields(node_id = %config.node_id))]
    pub fn new(config: NodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let policy = Arc::new(config.build_policy()?);
        let forwarding = config.forwarding_config();
        let mut dispatcher = ForwardingDispatcher::new(forwarding.default_result);
        let mut pipelines = BTreeMap::new();

        for operation in &config.operations {
            let codec = JsonMessageOperation::new(operation.action.clone())
                .with_contexts(operation.request_context(), operation.response_context());
            let pipeline = Arc::new(
                ForwardingPipeline::new(codec, forwarding.clone()).with_policy(Arc::clone(&policy)),
            );
            dispatcher.register(pipeline.clone())?;
            pipelines.insert(operation.action.clone(), pipeline);
        }

        info!(
            operations = pipelines.len(),
            default_result = %forwarding.default_result,
            default_verification = %policy.default_verification_action(),
            "Node container initialized"
        );

        Ok(Self {
            config,
            policy,
            pipelines,
            dispatcher,
        })
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<SignaturePolicy> {
        &self.policy
    }

    /// Pipeline of `action`, for registering filters and observers.
    #[must_use]
    pub fn pipeline(&self, action: &str) -> Option<&Arc<JsonPipeline>> {
        self.pipelines.get(action)
    }

    /// Configured actions, sorted.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    #[must_use]
    pub fn dispatcher(&self) -> &ForwardingDispatcher {
        &self.dispatcher
    }

    /// Route an action to a handler other than the JSON pass-through, e.g.
    /// a pipeline over typed OCPP messages.
    pub fn register_handler(&mut self, handler: Arc<dyn ForwardingHandler>) -> Result<(), ConfigError> {
        let action = handler.action().to_string();
        self.dispatcher.register(handler)?;
        info!(action = %action, "Handler registered");
        Ok(())
    }
}
