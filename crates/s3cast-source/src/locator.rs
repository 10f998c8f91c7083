use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("locator `{raw}` is missing a `<scheme>://` prefix")]
    MissingScheme { raw: String },

    #[error("locator `{raw}` has an invalid scheme `{scheme}`")]
    InvalidScheme { raw: String, scheme: String },

    #[error("locator `{raw}` has an empty bucket")]
    EmptyBucket { raw: String },
}

/// Address of a namespace of source objects: `<scheme>://<bucket>/<prefix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    scheme: String,
    bucket: String,
    prefix: String,
}

impl Locator {
    pub fn new(
        scheme: impl Into<String>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let trimmed = raw.trim();
        let Some((scheme, rest)) = trimmed.split_once("://") else {
            return Err(LocatorError::MissingScheme {
                raw: raw.to_string(),
            });
        };

        if !is_valid_scheme(scheme) {
            return Err(LocatorError::InvalidScheme {
                raw: raw.to_string(),
                scheme: scheme.to_string(),
            });
        }

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(LocatorError::EmptyBucket {
                raw: raw.to_string(),
            });
        }

        Ok(Self::new(scheme, bucket, prefix))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.prefix)
    }
}

// RFC 3986 scheme: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_scheme_bucket_and_prefix() {
        let locator = Locator::parse("s3://dimajix-training/data/alice").expect("parse");
        assert_eq!(locator.scheme(), "s3");
        assert_eq!(locator.bucket(), "dimajix-training");
        assert_eq!(locator.prefix(), "data/alice");
        assert_eq!(locator.to_string(), "s3://dimajix-training/data/alice");
    }

    #[test]
    fn parse_allows_bucket_without_prefix() {
        let bare = Locator::parse("s3://bucket").expect("parse bare");
        assert_eq!(bare.prefix(), "");

        let slash = Locator::parse("s3://bucket/").expect("parse slash");
        assert_eq!(slash.bucket(), "bucket");
        assert_eq!(slash.prefix(), "");
    }

    #[test]
    fn parse_lowercases_scheme_only() {
        let locator = Locator::parse("S3://Bucket/Data").expect("parse");
        assert_eq!(locator.scheme(), "s3");
        assert_eq!(locator.bucket(), "Bucket");
        assert_eq!(locator.prefix(), "Data");
    }

    #[test]
    fn parse_rejects_missing_scheme() {
        let err = Locator::parse("bucket/prefix").expect_err("must reject");
        assert!(matches!(err, LocatorError::MissingScheme { .. }));
    }

    #[test]
    fn parse_rejects_invalid_scheme_and_empty_bucket() {
        let err = Locator::parse("3s://bucket/x").expect_err("must reject scheme");
        assert!(matches!(err, LocatorError::InvalidScheme { .. }));

        let err = Locator::parse("s3:///prefix").expect_err("must reject bucket");
        assert!(matches!(err, LocatorError::EmptyBucket { .. }));
    }

    #[test]
    fn from_str_matches_parse() {
        let locator: Locator = "file://data/logs/".parse().expect("from_str");
        assert_eq!(locator, Locator::new("file", "data", "logs/"));
    }
}
