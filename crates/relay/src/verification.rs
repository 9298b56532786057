use {async_trait::async_trait, topicbridge_common::types::UserId};

/// Human-verification gate consulted before relaying a user's messages.
#[async_trait]
pub trait VerificationGate: Send + Sync {
    /// Whether the user has passed verification. Lookup failures count as
    /// unverified.
    async fn is_verified(&self, user: UserId) -> bool;

    /// Start a verification round for the user, typically by sending a link.
    async fn request_verification(&self, user: UserId);
}

/// Gate used when verification is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysVerified;

#[async_trait]
impl VerificationGate for AlwaysVerified {
    async fn is_verified(&self, _user: UserId) -> bool {
        true
    }

    async fn request_verification(&self, _user: UserId) {}
}
