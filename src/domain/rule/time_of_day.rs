use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// A wall-clock time of day ("HH:MM"), validated at construction. Rejects
/// malformed strings at write time per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TryFrom<String> for TimeOfDay {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (h, m) = value
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid time '{}', expected HH:MM", value))?;

        let hour: u32 = h
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid hour in '{}'", value))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid minute in '{}'", value))?;

        if hour > 23 || minute > 59 {
            anyhow::bail!("time '{}' out of range, expected 00:00..23:59", value);
        }

        Ok(Self { hour, minute })
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        format!("{:02}:{:02}", t.hour, t.minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_time() {
        let t = TimeOfDay::try_from("14:05".to_string()).unwrap();
        assert_eq!(t.hour, 14);
        assert_eq!(t.minute, 5);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(TimeOfDay::try_from("1400".to_string()).is_err());
        assert!(TimeOfDay::try_from("25:00".to_string()).is_err());
        assert!(TimeOfDay::try_from("12:60".to_string()).is_err());
    }
}
