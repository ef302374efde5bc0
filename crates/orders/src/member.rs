use std::sync::Arc;

use common::MemberId;
use domain::Member;
use store::{MEMBER_EMAIL_CONSTRAINT, MemberRepository};
use tracing::info;

use crate::error::{Result, ShopError};

/// Member registration and lookup.
pub struct MemberService<S> {
    store: Arc<S>,
}

impl<S: MemberRepository> MemberService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Registers a member. Emails are unique.
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, email: &str, nickname: &str) -> Result<Member> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ShopError::InvalidInput(format!("invalid email: {email:?}")));
        }
        if nickname.trim().is_empty() {
            return Err(ShopError::InvalidInput("nickname is required".into()));
        }
        if self.store.find_member_by_email(email).await?.is_some() {
            return Err(ShopError::MemberAlreadyExists {
                email: email.to_string(),
            });
        }

        let member = Member::new(email, nickname.trim());
        self.store.save_member(&member).await.map_err(|e| {
            if e.unique_constraint() == Some(MEMBER_EMAIL_CONSTRAINT) {
                ShopError::MemberAlreadyExists {
                    email: email.to_string(),
                }
            } else {
                ShopError::from(e)
            }
        })?;

        info!(member_id = %member.id, "Member registered");
        Ok(member)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Member> {
        self.store
            .find_member_by_email(email.trim())
            .await?
            .ok_or_else(|| ShopError::MemberNotFound(email.to_string()))
    }

    pub async fn find_by_id(&self, member_id: MemberId) -> Result<Member> {
        self.store
            .find_member(member_id)
            .await?
            .ok_or_else(|| ShopError::MemberNotFound(member_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use domain::MemberRole;
    use store::InMemoryShopStore;

    fn service() -> MemberService<InMemoryShopStore> {
        MemberService::new(Arc::new(InMemoryShopStore::new()))
    }

    #[tokio::test]
    async fn register_then_find() {
        let members = service();
        let member = members.register("kim@example.com", "kim").await.unwrap();
        assert_eq!(member.role, MemberRole::User);

        assert_eq!(members.find_by_email("kim@example.com").await.unwrap(), member);
        assert_eq!(members.find_by_id(member.id).await.unwrap(), member);
    }

    #[tokio::test]
    async fn email_is_unique() {
        let members = service();
        members.register("lee@example.com", "lee").await.unwrap();

        let err = members.register("lee@example.com", "other").await.unwrap_err();
        assert_eq!(err.code(), "M002");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn unknown_member() {
        let members = service();
        let err = members.find_by_email("nobody@example.com").await.unwrap_err();
        assert_eq!(err.code(), "M001");
        assert!(members.find_by_id(MemberId::new()).await.is_err());
    }

    #[tokio::test]
    async fn malformed_email_is_invalid_input() {
        let members = service();
        let err = members.register("not-an-email", "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
