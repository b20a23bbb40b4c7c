//! The [`Participant`] entity: a non-current-user member of a stream.

use crate::payload::ParticipantPayload;
use crate::types::{AccountId, AccountStatus, ActivityStatus, EpochMs};

/// A stream member other than the current user.
///
/// Participants are replaced wholesale whenever a stream ingests a new
/// `others` list. Only two narrow local mutations happen in place, because
/// they must not wait for a server round-trip: the played-until bump and the
/// transient activity-status bump.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: AccountId,
    payload: ParticipantPayload,
    activity_status: ActivityStatus,
    /// When the current activity status stops being valid.
    activity_status_end: EpochMs,
}

impl Participant {
    pub fn from_payload(payload: ParticipantPayload) -> Self {
        Self {
            id: payload.id,
            payload,
            activity_status: ActivityStatus::Idle,
            activity_status_end: 0,
        }
    }

    pub fn display_name(&self) -> &str {
        self.payload.display_name.as_deref().unwrap_or("")
    }

    pub fn image_url(&self) -> Option<&str> {
        self.payload.image_url.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.payload.location.as_deref()
    }

    pub fn time_zone(&self) -> Option<&str> {
        self.payload.timezone.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.payload.username.as_deref()
    }

    pub fn owner_id(&self) -> Option<AccountId> {
        self.payload.owner_id
    }

    pub fn status(&self) -> AccountStatus {
        self.payload.status.unwrap_or(AccountStatus::Unknown)
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    pub fn is_bot(&self) -> bool {
        self.status().is_bot()
    }

    /// How far into the stream this participant has played, in epoch ms.
    pub fn played_until(&self) -> EpochMs {
        self.payload.played_until.unwrap_or(0)
    }

    /// When the participant most recently advanced their play position.
    pub fn played_until_changed(&self) -> EpochMs {
        self.payload.played_until_changed.unwrap_or(0)
    }

    pub fn activity_status(&self) -> ActivityStatus {
        self.activity_status
    }

    pub fn activity_status_end(&self) -> EpochMs {
        self.activity_status_end
    }

    /// Local play-position bump; also stamps the change time.
    pub fn set_played_until(&mut self, played_until: EpochMs, now: EpochMs) {
        self.payload.played_until = Some(played_until);
        self.payload.played_until_changed = Some(now);
    }

    /// Sets a transient activity status valid for `duration_ms` from `now`.
    pub fn set_activity_status(
        &mut self,
        status: ActivityStatus,
        duration_ms: i64,
        now: EpochMs,
    ) {
        self.activity_status = status;
        self.activity_status_end = now + duration_ms;
    }

    /// Reverts an expired status to idle. Returns whether anything changed.
    pub fn expire_activity_status(&mut self, now: EpochMs) -> bool {
        if self.activity_status != ActivityStatus::Idle && self.activity_status_end < now {
            self.activity_status = ActivityStatus::Idle;
            self.activity_status_end = 0;
            return true;
        }
        false
    }

    pub fn payload(&self) -> &ParticipantPayload {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: i64) -> Participant {
        Participant::from_payload(ParticipantPayload::from_id(AccountId(id)))
    }

    #[test]
    fn activity_status_expires_to_idle() {
        let mut p = participant(1);
        p.set_activity_status(ActivityStatus::Recording, 5000, 1000);
        assert_eq!(p.activity_status(), ActivityStatus::Recording);

        // Not yet expired.
        assert!(!p.expire_activity_status(5000));
        assert_eq!(p.activity_status(), ActivityStatus::Recording);

        assert!(p.expire_activity_status(6001));
        assert_eq!(p.activity_status(), ActivityStatus::Idle);
        // Idempotent once idle.
        assert!(!p.expire_activity_status(7000));
    }

    #[test]
    fn played_until_bump_stamps_change_time() {
        let mut p = participant(2);
        p.set_played_until(9000, 12_345);
        assert_eq!(p.played_until(), 9000);
        assert_eq!(p.played_until_changed(), 12_345);
    }
}
