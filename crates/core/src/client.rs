//! The façade test code talks to

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ClientConfig, PollPolicy, ProviderMode};
use crate::error::{Error, Result};
use crate::identity::IdentityProvisioner;
use crate::links::LinkExtractor;
use crate::poller::{NotificationPoller, WaitSpec};
use crate::provider::{FakeProvider, HardcodedProvider, MailboxTransport, Provider, ProviderAdapter};
use crate::template::{ExpectedTemplate, Placeholders, TemplateCatalog};
use crate::types::{NotificationMessage, Role, TestIdentity};
use crate::validator::{ContentValidator, ValidationReport};

/// Slack subtracted from an identity's creation time before filtering, so a
/// provider clock running behind ours does not hide fresh messages
const SINCE_CLOCK_SKEW_SECS: i64 = 5;

/// A matched message together with its validation report
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedNotification {
    pub identity: TestIdentity,
    pub template: String,
    pub message: NotificationMessage,
    pub report: ValidationReport,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// One entry for [`NotificationClient::wait_all`]
#[derive(Debug, Clone)]
pub struct WaitRequest {
    pub identity: TestIdentity,
    pub template: ExpectedTemplate,
    pub values: Placeholders,
    pub timeout: Option<Duration>,
}

impl WaitRequest {
    pub fn new(identity: TestIdentity, template: ExpectedTemplate, values: Placeholders) -> Self {
        Self {
            identity,
            template,
            values,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Provisions identities, waits for notifications and extracts links
pub struct NotificationClient {
    config: ClientConfig,
    provider: Arc<Provider>,
    provisioner: IdentityProvisioner,
    poller: NotificationPoller,
    validator: ContentValidator,
    links: Arc<LinkExtractor>,
    templates: TemplateCatalog,
    shutdown: CancellationToken,
}

impl NotificationClient {
    /// Validate `config` and build the selected backend
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let provider = Provider::from_config(&config.provider)?;
        Self::assemble(config, provider)
    }

    /// Live client over an injected transport. The configuration is validated
    /// before the transport is touched.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn MailboxTransport>) -> Result<Self> {
        config.validate()?;
        if config.provider.mode != ProviderMode::Live {
            return Err(Error::InvalidConfiguration(format!(
                "a mailbox transport only applies to live mode, config selects {}",
                config.provider.mode
            )));
        }
        let provider = Provider::live_with_transport(transport)?;
        Self::assemble(config, provider)
    }

    fn assemble(config: ClientConfig, provider: Provider) -> Result<Self> {
        let links = Arc::new(LinkExtractor::from_settings(&config.links)?);
        let templates = match &config.templates {
            Some(path) => TemplateCatalog::from_file(path)?,
            None => TemplateCatalog::builtin()?,
        };
        for template in templates.iter() {
            for category in &template.required_link_categories {
                links.rule(category).map_err(|_| {
                    Error::InvalidConfiguration(format!(
                        "template '{}' requires link category '{}' but no link rule defines it",
                        template.name, category
                    ))
                })?;
            }
        }

        let provider = Arc::new(provider);
        let adapter: Arc<dyn ProviderAdapter> = provider.clone();
        info!(
            mode = %config.provider.mode,
            templates = templates.len(),
            link_domain = links.base_domain(),
            strict = config.strict,
            "notification client ready"
        );

        Ok(Self {
            provisioner: IdentityProvisioner::new(adapter.clone()),
            poller: NotificationPoller::new(adapter),
            validator: ContentValidator::new(links.clone()),
            links,
            templates,
            provider,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn mode(&self) -> ProviderMode {
        self.config.provider.mode
    }

    /// False in hardcoded mode: a passing wait there only means a message was
    /// supplied out-of-band
    pub fn supports_verification(&self) -> bool {
        self.mode().verifies_delivery()
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }

    pub fn template(&self, name: &str) -> Result<&ExpectedTemplate> {
        self.templates.get(name)
    }

    pub fn links(&self) -> &LinkExtractor {
        &self.links
    }

    /// Fake backend handle for registering scenarios, when in fake mode
    pub fn fake(&self) -> Option<&FakeProvider> {
        self.provider.as_fake()
    }

    /// Hardcoded backend handle for supplying messages, when in hardcoded mode
    pub fn hardcoded(&self) -> Option<&HardcodedProvider> {
        self.provider.as_hardcoded()
    }

    pub async fn provision_identity(&self, role: Role) -> Result<TestIdentity> {
        self.provisioner.provision(role).await
    }

    pub fn identity_for(&self, role: Role) -> Option<TestIdentity> {
        self.provisioner.identity_for(role)
    }

    pub fn identities(&self) -> Vec<TestIdentity> {
        self.provisioner.identities()
    }

    /// Wait for the notification described by `template` to reach `identity`
    pub async fn wait_for_notification(
        &self,
        identity: &TestIdentity,
        template: &ExpectedTemplate,
        values: &Placeholders,
        timeout_override: Option<Duration>,
    ) -> Result<VerifiedNotification> {
        let token = self.shutdown.child_token();
        self.wait_inner(identity, template, values, timeout_override, &token)
            .await
    }

    /// [`wait_for_notification`](Self::wait_for_notification) that also stops
    /// when `cancel` fires
    pub async fn wait_for_notification_with_cancel(
        &self,
        identity: &TestIdentity,
        template: &ExpectedTemplate,
        values: &Placeholders,
        timeout_override: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<VerifiedNotification> {
        let token = self.shutdown.child_token();
        let forward = async {
            cancel.cancelled().await;
            token.cancel();
            futures::future::pending::<Infallible>().await
        };
        tokio::select! {
            result = self.wait_inner(identity, template, values, timeout_override, &token) => result,
            never = forward => match never {},
        }
    }

    /// Look the template up by name, then wait
    pub async fn wait_for_named(
        &self,
        identity: &TestIdentity,
        template_name: &str,
        values: &Placeholders,
        timeout_override: Option<Duration>,
    ) -> Result<VerifiedNotification> {
        let template = self.templates.get(template_name)?;
        self.wait_for_notification(identity, template, values, timeout_override)
            .await
    }

    /// Run independent waits concurrently; results keep the request order
    pub async fn wait_all(&self, requests: &[WaitRequest]) -> Vec<Result<VerifiedNotification>> {
        join_all(requests.iter().map(|r| {
            self.wait_for_notification(&r.identity, &r.template, &r.values, r.timeout)
        }))
        .await
    }

    /// Abort every in-flight wait at its next poll boundary
    pub fn cancel_all(&self) {
        info!("cancelling all in-flight waits");
        self.shutdown.cancel();
    }

    pub fn extract_link(&self, message: &NotificationMessage, category: &str) -> Result<String> {
        self.links.extract(message, category)
    }

    pub fn extract_token(&self, message: &NotificationMessage, category: &str) -> Result<String> {
        self.links.extract_token(message, category)
    }

    fn policy(&self, timeout_override: Option<Duration>) -> PollPolicy {
        match timeout_override {
            Some(timeout) => self.config.poll.with_timeout(timeout),
            None => self.config.poll,
        }
    }

    async fn wait_inner(
        &self,
        identity: &TestIdentity,
        template: &ExpectedTemplate,
        values: &Placeholders,
        timeout_override: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<VerifiedNotification> {
        let values = values.clone().with("address", identity.address());
        let subject = template.subject_matcher(&values)?;
        let description = format!("'{}' ({})", template.name, subject);
        let matcher = |m: &NotificationMessage| subject.matches(m.subject());

        let outcome = self
            .poller
            .wait_for(
                WaitSpec {
                    identity,
                    matcher: &matcher,
                    description: &description,
                    since: Some(identity.created_at() - chrono::Duration::seconds(SINCE_CLOCK_SKEW_SECS)),
                    policy: self.policy(timeout_override),
                },
                cancel,
            )
            .await?;

        let report = self.validator.validate(&outcome.message, template, &values)?;
        let report = if self.config.strict {
            report.into_result(identity.address())?
        } else {
            if !report.is_ok() {
                warn!(template = %template.name, address = identity.address(), "validation failed:\n{}", report);
            }
            report
        };

        Ok(VerifiedNotification {
            identity: identity.clone(),
            template: template.name.clone(),
            message: outcome.message,
            report,
            attempts: outcome.attempts,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
        })
    }
}

impl Drop for NotificationClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
