//! Database configuration.

/// Postgres connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: postgres_url("localhost", "postgres", "postgres", "anb", "5432"),
            max_connections: 5,
        }
    }
}

impl StoreConfig {
    /// `DATABASE_URL`, or a URL assembled from `POSTGRES_HOST`, `POSTGRES_USER`,
    /// `POSTGRES_PASSWORD`, `POSTGRES_DB` and `POSTGRES_PORT`.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| {
                let var = |name: &str, default: &str| {
                    std::env::var(name).unwrap_or_else(|_| default.to_string())
                };
                postgres_url(
                    &var("POSTGRES_HOST", "localhost"),
                    &var("POSTGRES_USER", "postgres"),
                    &var("POSTGRES_PASSWORD", "postgres"),
                    &var("POSTGRES_DB", "anb"),
                    &var("POSTGRES_PORT", "5432"),
                )
            });

        Self {
            database_url,
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }
}

fn postgres_url(host: &str, user: &str, password: &str, db: &str, port: &str) -> String {
    format!("postgres://{user}:{password}@{host}:{port}/{db}?sslmode=disable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_url() {
        assert_eq!(
            postgres_url("db", "anb", "secret", "videos", "5433"),
            "postgres://anb:secret@db:5433/videos?sslmode=disable"
        );
    }
}
