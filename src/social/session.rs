use time::OffsetDateTime;
use tracing::{debug, info};

use super::Social;
use crate::model::{Group, GroupId, Identity, User};
use crate::{Error, Result};

/// One acting user's handle on the engine. Holds the current group selection.
pub struct UserSession {
    pub(super) social: Social,
    pub(super) identity: Identity,
    pub(super) current_group: Option<GroupId>,
}

impl UserSession {
    pub(super) async fn start(social: Social, identity: Identity) -> Result<Self> {
        if let Identity::User { id, name } = &identity {
            if social
                .store()
                .insert_profile(&User::new(id.as_str(), name.as_str(), OffsetDateTime::now_utc()))
                .await?
            {
                info!(user_id = %id, "profile created");
            }
        }

        Ok(Self {
            social,
            identity,
            current_group: None,
        })
    }

    pub(super) async fn restore_current_group(&mut self, group_id: Option<GroupId>) -> Result<()> {
        let Some(group_id) = group_id else {
            return Ok(());
        };
        let valid = match &self.identity {
            Identity::Guest => self
                .social
                .store()
                .group(group_id)
                .await?
                .is_some_and(|g| g.visibility.is_public()),
            Identity::User { id, .. } => self.social.store().is_member(group_id, id).await?,
        };
        if valid {
            self.current_group = Some(group_id);
        } else {
            debug!(%group_id, "dropped stale group selection");
        }
        Ok(())
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn current_group(&self) -> Option<GroupId> {
        self.current_group
    }

    /// The acting user's profile; `None` for guests.
    pub async fn user(&self) -> Result<Option<User>> {
        match &self.identity {
            Identity::Guest => Ok(None),
            Identity::User { id, .. } => self.social.store().profile(id).await,
        }
    }

    /// Groups the acting user belongs to.
    pub async fn my_groups(&self) -> Result<Vec<Group>> {
        match &self.identity {
            Identity::Guest => Ok(Vec::new()),
            Identity::User { id, .. } => self.social.store().groups_of(id).await,
        }
    }

    /// `(user id, display name)` of a signed-in actor.
    pub(super) fn signed_in(&self, action: &'static str) -> Result<(&str, &str)> {
        match &self.identity {
            Identity::Guest => Err(Error::GuestRefused(action)),
            Identity::User { id, name } => Ok((id, name)),
        }
    }

    /// The current group, checked to still have the actor as a member.
    pub(super) async fn member_group(&self, action: &'static str) -> Result<GroupId> {
        let (user_id, _) = self.signed_in(action)?;
        let group_id = self
            .current_group
            .ok_or_else(|| Error::invalid("no group selected"))?;
        if !self.social.store().is_member(group_id, user_id).await? {
            return Err(Error::invalid("not a member of the selected group"));
        }
        Ok(group_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::Config;
    use crate::model::{Identity, Visibility};
    use crate::social::Social;
    use crate::store::Store;

    #[tokio::test]
    async fn first_sign_in_creates_the_profile() {
        let social = Social::start(Store::in_memory().await.unwrap(), &Config::default());
        let me = social.session(Identity::user("u1", "Amina")).await.unwrap();
        let user = me.user().await.unwrap().unwrap();
        assert_eq!((user.pages_read, user.daily_goal), (0, 10));

        let again = social.session(Identity::user("u1", "Amina")).await.unwrap();
        assert_eq!(again.user().await.unwrap().unwrap(), user);
    }

    #[tokio::test]
    async fn resume_drops_stale_selection() {
        let social = Social::start(Store::in_memory().await.unwrap(), &Config::default());
        let mut owner = social.session(Identity::user("u1", "Amina")).await.unwrap();
        let private = owner.create_group("Tahajjud", "", Visibility::Private).await.unwrap();
        let public = owner.create_group("Fajr Club", "", Visibility::Public).await.unwrap();

        let back = social.resume(Identity::user("u1", "Amina"), Some(private.id)).await.unwrap();
        assert_eq!(back.current_group(), Some(private.id));

        let outsider = social.resume(Identity::user("u2", "Omar"), Some(public.id)).await.unwrap();
        assert_eq!(outsider.current_group(), None);

        let guest = social.resume(Identity::Guest, Some(private.id)).await.unwrap();
        assert_eq!(guest.current_group(), None);
        let guest = social.resume(Identity::Guest, Some(public.id)).await.unwrap();
        assert_eq!(guest.current_group(), Some(public.id));
    }
}
