//! Mode and ownership changes

use confix_fs::{FileAttributes, NormalizedPath};

use super::{ChangeEvent, ChangeKind, ChangeLog, EventId};
use crate::Result;

impl ChangeLog {
    /// Bring `target`'s mode and owner to `desired` and, when `id` is given,
    /// record the change so it can be undone.
    ///
    /// `uid`/`gid` left as `None` keep the current owner. Returns `false`
    /// when the target already matches; nothing is recorded then.
    pub fn record_permission_change(
        &mut self,
        target: &NormalizedPath,
        desired: FileAttributes,
        id: Option<EventId>,
    ) -> Result<bool> {
        let prior = FileAttributes::capture(target)?.ok_or_else(|| {
            confix_fs::Error::io(
                target.to_native(),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
        })?;
        let new = FileAttributes {
            mode: desired.mode,
            uid: desired.uid.or(prior.uid),
            gid: desired.gid.or(prior.gid),
        };
        if new == prior {
            return Ok(false);
        }

        new.apply(target)?;
        {
            let _guard = self.ctx.enter();
            tracing::info!(target = %target, prior = format!("{:o}", prior.mode), new = format!("{:o}", new.mode), "Changed permissions");
        }

        if let Some(id) = id {
            let kind = ChangeKind::PermissionChange { prior, new };
            self.record_change_event(id, ChangeEvent::new(id, target.clone(), kind))?;
        }
        Ok(true)
    }
}
