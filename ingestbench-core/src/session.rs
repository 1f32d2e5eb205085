use ingestbench_http::NDJSON_CONTENT_TYPE;

use crate::sdk::SdkRun;

/// Identity and headers for direct HTTP ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSession {
    pub run_id: u64,
    pub headers: Vec<(String, String)>,
}

impl HttpSession {
    #[must_use]
    pub fn new(run_id: u64, api_key: &str, project_name: &str) -> Self {
        Self {
            run_id,
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {api_key}")),
                ("X-Run-Id".to_string(), run_id.to_string()),
                ("X-Project-Name".to_string(), project_name.to_string()),
                (
                    "Content-Type".to_string(),
                    NDJSON_CONTENT_TYPE.to_string(),
                ),
            ],
        }
    }
}

/// Per-user state created by setup and consumed by teardown.
pub enum Session {
    Http(HttpSession),
    Sdk(Box<dyn SdkRun>),
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(s) => f.debug_tuple("Http").field(&s.run_id).finish(),
            Self::Sdk(run) => f.debug_tuple("Sdk").field(&run.run_id()).finish(),
        }
    }
}

/// One simulated client. Owned by exactly one actor task.
#[derive(Debug)]
pub struct VirtualUser {
    id: u64,
    step: u64,
    session: Session,
}

impl VirtualUser {
    #[must_use]
    pub fn new(id: u64, session: Session) -> Self {
        Self {
            id,
            step: 0,
            session,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Advances the local step counter and returns the new value.
    pub fn next_step(&mut self) -> u64 {
        self.step = self.step.saturating_add(1);
        self.step
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn http_session(&self) -> Option<&HttpSession> {
        match &self.session {
            Session::Http(s) => Some(s),
            Session::Sdk(_) => None,
        }
    }

    pub fn sdk_run(&self) -> Option<&dyn SdkRun> {
        match &self.session {
            Session::Sdk(run) => Some(run.as_ref()),
            Session::Http(_) => None,
        }
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}
