#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: String,
    pub remote_addr: String,
    pub secret: Option<String>,
}

impl Config {
    /// An empty secret disables the authentication gate.
    #[must_use]
    pub fn new(listen_addr: String, remote_addr: String, secret: Option<String>) -> Self {
        Self {
            listen_addr,
            remote_addr,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        self.secret.is_some()
    }
}
