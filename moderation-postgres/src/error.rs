use moderation_core::event::Version;

/// Error type for `PostgreSQL` event store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Query execution or transaction failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A version supplied by a caller does not fit in a `BIGINT`.
    #[error("version {0} exceeds the supported range")]
    VersionOutOfRange(Version),
    /// The database returned a negative version.
    #[error("invalid version value from database: {0}")]
    InvalidVersion(i64),
}

pub(crate) fn to_db_version(version: Version) -> Result<i64, Error> {
    i64::try_from(version).map_err(|_| Error::VersionOutOfRange(version))
}

pub(crate) fn from_db_version(version: i64) -> Result<Version, Error> {
    Version::try_from(version).map_err(|_| Error::InvalidVersion(version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_round_trip_within_bigint_range() {
        assert_eq!(to_db_version(42).unwrap(), 42);
        assert_eq!(from_db_version(42).unwrap(), 42);
    }

    #[test]
    fn oversized_version_is_rejected() {
        assert!(matches!(
            to_db_version(u64::MAX),
            Err(Error::VersionOutOfRange(u64::MAX))
        ));
    }

    #[test]
    fn negative_database_version_is_rejected() {
        assert!(matches!(from_db_version(-1), Err(Error::InvalidVersion(-1))));
    }
}
