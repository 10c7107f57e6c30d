use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle aggregation timeframes supported by indicator triggers (spec §3,
/// trigger family `indicator`). Wire format is the short form ("1m", "5m",
/// ...) used by `trigger_config.timeframe`, delegated to `FromStr`/`Display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    OneMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    OneDay,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::FiveMin => 5,
            Timeframe::FifteenMin => 15,
            Timeframe::ThirtyMin => 30,
            Timeframe::OneHour => 60,
            Timeframe::OneDay => 1440,
        }
    }

    pub fn to_seconds(&self) -> i64 {
        self.to_minutes() * 60
    }

    /// Snaps a unix timestamp (seconds) to the start of its bar, per spec §3
    /// invariant: `bar start aligned to floor(tick_time / timeframe) * timeframe`.
    pub fn window_start(&self, ts_secs: i64) -> i64 {
        let period = self.to_seconds();
        ts_secs - ts_secs.rem_euclid(period)
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(Timeframe::OneMin),
            "5m" => Ok(Timeframe::FiveMin),
            "15m" => Ok(Timeframe::FifteenMin),
            "30m" => Ok(Timeframe::ThirtyMin),
            "1h" => Ok(Timeframe::OneHour),
            "1d" => Ok(Timeframe::OneDay),
            _ => anyhow::bail!(
                "invalid timeframe '{}', expected one of 1m,5m,15m,30m,1h,1d",
                s
            ),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::OneMin => "1m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::OneDay => "1d",
        };
        write!(f, "{}", s)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_supported_string() {
        assert_eq!(Timeframe::from_str("1m").unwrap(), Timeframe::OneMin);
        assert_eq!(Timeframe::from_str("5m").unwrap(), Timeframe::FiveMin);
        assert_eq!(Timeframe::from_str("15m").unwrap(), Timeframe::FifteenMin);
        assert_eq!(Timeframe::from_str("30m").unwrap(), Timeframe::ThirtyMin);
        assert_eq!(Timeframe::from_str("1h").unwrap(), Timeframe::OneHour);
        assert_eq!(Timeframe::from_str("1d").unwrap(), Timeframe::OneDay);
        assert!(Timeframe::from_str("3m").is_err());
    }

    #[test]
    fn serializes_to_the_short_wire_form() {
        let json = serde_json::to_string(&Timeframe::FiveMin).unwrap();
        assert_eq!(json, "\"5m\"");
        let back: Timeframe = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Timeframe::FiveMin);
        assert!(serde_json::from_str::<Timeframe>("\"3m\"").is_err());
    }

    #[test]
    fn window_start_snaps_down_to_boundary() {
        let tf = Timeframe::FiveMin;
        assert_eq!(tf.window_start(0), 0);
        assert_eq!(tf.window_start(299), 0);
        assert_eq!(tf.window_start(300), 300);
        assert_eq!(tf.window_start(301), 300);
    }
}
