//! Broker topics and their string form.
//!
//! `alerts`, `live_data:{siteId}` and `predictions:{siteId}`. A site of `*`
//! is the wildcard that receives every site's events.

use std::fmt;
use std::str::FromStr;

use geowatch_core::types::SiteId;

const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Alerts,
    /// `None` is the all-sites wildcard.
    LiveData(Option<SiteId>),
    Predictions(Option<SiteId>),
}

impl Topic {
    pub fn live_data(site_id: impl Into<SiteId>) -> Self {
        Topic::LiveData(Some(site_id.into()))
    }

    pub fn predictions(site_id: impl Into<SiteId>) -> Self {
        Topic::Predictions(Some(site_id.into()))
    }

    /// The wildcard topic that also receives this topic's events, if any.
    pub fn wildcard(&self) -> Option<Topic> {
        match self {
            Topic::LiveData(Some(_)) => Some(Topic::LiveData(None)),
            Topic::Predictions(Some(_)) => Some(Topic::Predictions(None)),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (prefix, site) = match self {
            Topic::Alerts => return f.write_str("alerts"),
            Topic::LiveData(site) => ("live_data", site),
            Topic::Predictions(site) => ("predictions", site),
        };
        write!(f, "{prefix}:{}", site.as_deref().unwrap_or(WILDCARD))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic '{0}'")]
pub struct ParseTopicError(pub String);

impl FromStr for Topic {
    type Err = ParseTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "alerts" {
            return Ok(Topic::Alerts);
        }
        let (prefix, site) = s.split_once(':').ok_or_else(|| ParseTopicError(s.to_string()))?;
        let site = match site {
            "" => return Err(ParseTopicError(s.to_string())),
            WILDCARD => None,
            other => Some(other.to_string()),
        };
        match prefix {
            "live_data" => Ok(Topic::LiveData(site)),
            "predictions" => Ok(Topic::Predictions(site)),
            _ => Err(ParseTopicError(s.to_string())),
        }
    }
}
