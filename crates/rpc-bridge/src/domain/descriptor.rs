//! Static descriptions of services and their remote calls.
//!
//! A descriptor says where a call lives and how its request and response are
//! carried over HTTP. The message schema itself is the handler's Rust type.

/// A service groups remote calls served by one HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Service name (used in logs and registration checks)
    pub name: String,
    /// Path prefix shared by every call of the service ("" for none)
    pub path_prefix: String,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path_prefix: path_prefix.into(),
        }
    }
}

/// How the request body is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// One serialized message, fully buffered before the handler runs
    Message,
    /// Separator-delimited messages, decoded incrementally
    Stream,
    /// Raw bytes, handed to the handler untouched
    Bytes,
}

/// How the response body is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// One serialized message
    Message,
    /// Raw bytes
    Bytes,
}

/// Query parameter carrying a stringified metadata message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDescriptor {
    pub key: String,
}

/// Header carrying the signed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDescriptor {
    pub key: String,
}

/// One remote call of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCallDescriptor {
    pub name: String,
    /// Path relative to the service prefix, starting with '/'
    pub path: String,
    /// Owning service
    pub service: ServiceDescriptor,
    pub body: BodyKind,
    pub metadata: Option<MetadataDescriptor>,
    pub auth: Option<AuthDescriptor>,
    pub response: ResponseKind,
}

impl RemoteCallDescriptor {
    /// Descriptor for a message-in, message-out call without metadata or auth.
    pub fn new(
        service: &ServiceDescriptor,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            service: service.clone(),
            body: BodyKind::Message,
            metadata: None,
            auth: None,
            response: ResponseKind::Message,
        }
    }

    pub fn with_body(mut self, body: BodyKind) -> Self {
        self.body = body;
        self
    }

    pub fn with_response(mut self, response: ResponseKind) -> Self {
        self.response = response;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>) -> Self {
        self.metadata = Some(MetadataDescriptor { key: key.into() });
        self
    }

    pub fn with_auth(mut self, key: impl Into<String>) -> Self {
        self.auth = Some(AuthDescriptor { key: key.into() });
        self
    }

    /// Route path: service prefix followed by the call path
    pub fn full_path(&self) -> String {
        format!("{}{}", self.service.path_prefix, self.path)
    }
}
