//! Call identifier types.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Identifier correlating a remote tool invocation with its result.
///
/// Ids are UUIDv7, so they order by issue time and logs from one session sort
/// in call order.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Issues a fresh identifier stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Milliseconds since the Unix epoch at which the id was issued, or
    /// `None` for ids parsed from another UUID version.
    #[must_use]
    pub fn issued_at_ms(&self) -> Option<u64> {
        let (secs, nanos) = self.0.get_timestamp()?.to_unix();
        Some(secs * 1_000 + u64::from(nanos) / 1_000_000)
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CallId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for CallId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn ids_sort_in_issue_order() {
        let ids: Vec<_> = (0..32).map(|_| CallId::new()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn carries_issue_time() {
        let before = u64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis())
            .unwrap();
        let issued = CallId::new().issued_at_ms().expect("v7 timestamp");
        assert!(issued + 1 >= before);

        let legacy: CallId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        assert_eq!(legacy.issued_at_ms(), None);
    }

    #[test]
    fn parses_display_output() {
        let id = CallId::new();
        assert_eq!(id.to_string().parse::<CallId>().unwrap(), id);
    }

    #[test]
    fn rejects_garbage() {
        let err = "not-a-uuid".parse::<CallId>().expect_err("should fail");
        assert!(matches!(err, Error::InvalidCallId { .. }));
    }
}
