use std::env;

#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Files written under `upload_dir` and served at `/uploads`.
    Local { upload_dir: String },
    /// Supabase Storage REST API; the bucket must be public.
    Supabase {
        url: String,
        service_role: String,
        bucket: String,
    },
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());
        let backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .trim()
            .to_ascii_lowercase();

        if backend == "supabase" {
            match (env::var("SUPABASE_URL"), env::var("SUPABASE_SERVICE_ROLE")) {
                (Ok(url), Ok(service_role)) => {
                    return Self::Supabase {
                        url: url.trim_end_matches('/').to_string(),
                        service_role,
                        bucket: env::var("SUPABASE_BUCKET")
                            .unwrap_or_else(|_| "issue-photos".to_string()),
                    };
                }
                _ => tracing::warn!(
                    "STORAGE_BACKEND=supabase but SUPABASE_URL/SUPABASE_SERVICE_ROLE missing, using local storage"
                ),
            }
        }

        Self::Local { upload_dir }
    }

    pub fn local_dir(&self) -> Option<&str> {
        match self {
            Self::Local { upload_dir } => Some(upload_dir),
            Self::Supabase { .. } => None,
        }
    }
}
