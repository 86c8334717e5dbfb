use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntrantResultError {
    #[error("Entrant did not have a finish time")]
    NoFinishTime,
    #[error("Error parsing finish time: {0}")]
    ParseError(String),
}

#[derive(Deserialize, Debug)]
pub struct RaceStatus {
    // open
    // invitational
    // pending
    // in_progress
    // finished
    // cancelled
    pub value: String,
}

#[derive(Deserialize, Debug)]
pub struct EntrantUser {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct EntrantStatus {
    // requested (requested to join)
    // invited (invited to join)
    // declined (declined invitation)
    // ready
    // not_ready
    // in_progress
    // done
    // dnf (did not finish, i.e. forfeited)
    // dq (disqualified)
    pub value: String,
}

#[derive(Deserialize, Debug)]
pub struct Entrant {
    pub user: EntrantUser,
    pub status: EntrantStatus,
    pub finished_at: Option<String>,
}

/// what an entrant's status on the race service means for their async race row
#[derive(Debug, PartialEq, Eq)]
pub enum EntrantOutcome {
    Done(DateTime<Utc>),
    Dnf,
    /// disqualification timestamp is recorded for historical purposes
    Dq(Option<DateTime<Utc>>),
    /// still racing (or never started); needs another recording pass
    NotDone,
}

impl Entrant {
    fn finished_at(&self) -> Result<DateTime<Utc>, EntrantResultError> {
        let raw = self
            .finished_at
            .as_ref()
            .ok_or(EntrantResultError::NoFinishTime)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| EntrantResultError::ParseError(e.to_string()))
    }

    pub fn outcome(&self) -> Result<EntrantOutcome, EntrantResultError> {
        match self.status.value.as_str() {
            "done" => Ok(EntrantOutcome::Done(self.finished_at()?)),
            "dnf" => Ok(EntrantOutcome::Dnf),
            "dq" => Ok(EntrantOutcome::Dq(self.finished_at().ok())),
            _ => Ok(EntrantOutcome::NotDone),
        }
    }
}

/// the race service's `GET /{slug}/data` snapshot
#[derive(Deserialize, Debug)]
pub struct RaceSnapshot {
    pub status: RaceStatus,
    pub entrants: Vec<Entrant>,
}

#[cfg(test)]
mod tests {
    use super::{EntrantOutcome, RaceSnapshot};

    #[test]
    fn test_deserialize_snapshot() {
        let raw = r#"{
            "status": {"value": "finished"},
            "entrants": [
                {
                    "user": {"id": "abc123", "name": "runner one"},
                    "status": {"value": "done"},
                    "finished_at": "2023-04-15T19:23:45+00:00"
                },
                {
                    "user": {"id": "def456", "name": "runner two"},
                    "status": {"value": "dnf"},
                    "finished_at": null
                },
                {
                    "user": {"id": "ghi789", "name": "runner three"},
                    "status": {"value": "in_progress"},
                    "finished_at": null
                }
            ]
        }"#;
        let snapshot: RaceSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!("finished", snapshot.status.value);
        assert_eq!(3, snapshot.entrants.len());
        match snapshot.entrants[0].outcome().unwrap() {
            EntrantOutcome::Done(t) => assert_eq!(1681586625, t.timestamp()),
            o => panic!("Expected Done, got {o:?}"),
        }
        assert_eq!(EntrantOutcome::Dnf, snapshot.entrants[1].outcome().unwrap());
        assert_eq!(
            EntrantOutcome::NotDone,
            snapshot.entrants[2].outcome().unwrap()
        );
    }
}
