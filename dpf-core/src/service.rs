// MIT License
// Copyright 2023--present dpf-core developers

//! Connection to a DPF server and loading of operator plugins.
//!
//! A [`Service`] owns the single session shared by every operator created
//! from it, together with the registry used to validate pins. It is cheap to
//! clone; clones share the same session.
//!
//! ## Plugins
//!
//! The server ships its operators in native plugin libraries. After
//! connecting, [`Service::load_default_plugins`] asks the server to load the
//! MAPDL and mesh operator libraries and reports one [`PluginOutcome`] per
//! library instead of discarding failures.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::{BuildConfiguration, ServiceConfig};
use crate::error::{Error, Result};
use crate::operator::Operator;
use crate::registry::SpecificationRegistry;
use crate::session::{PluginRequest, Session};

/// Result of loading one plugin library.
#[derive(Debug)]
pub struct PluginOutcome {
    pub request: PluginRequest,
    pub result: Result<()>,
}

impl PluginOutcome {
    pub fn is_loaded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Libraries loaded by [`Service::load_default_plugins`], per platform and
/// build flavour.
pub fn default_plugin_requests(configuration: BuildConfiguration, unix: bool) -> Vec<PluginRequest> {
    [
        ("mapdlOperatorsCore", "mapdl_operators"),
        ("meshOperatorsCore", "mesh_operators"),
    ]
    .into_iter()
    .map(|(stem, name)| {
        let file = if unix {
            format!("lib{stem}.so")
        } else {
            match configuration {
                BuildConfiguration::Release => format!("{stem}.dll"),
                BuildConfiguration::Debug => format!("{stem}D.dll"),
            }
        };
        PluginRequest::new(&file, name)
    })
    .collect()
}

struct ServiceInner {
    session: Mutex<Box<dyn Session>>,
    registry: Arc<SpecificationRegistry>,
    config: ServiceConfig,
}

#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("endpoint", &self.inner.config.endpoint())
            .field("kinds", &self.inner.registry.len())
            .finish()
    }
}

impl Service {
    /// Wrap an established session. No plugin is loaded.
    pub fn new<S: Session + 'static>(
        session: S,
        registry: SpecificationRegistry,
        config: ServiceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                session: Mutex::new(Box::new(session)),
                registry: Arc::new(registry),
                config,
            }),
        }
    }

    /// Connect over RPC, waiting for readiness up to the configured timeout,
    /// then load the default plugins if the configuration asks for it.
    #[cfg(feature = "rpc")]
    pub fn connect(config: ServiceConfig) -> Result<(Self, Vec<PluginOutcome>)> {
        let session = crate::rpc::client::RpcSession::connect(
            &config.host,
            config.port,
            config.connect_timeout(),
        )?;
        let load = config.load_default_plugins;
        let service = Self::new(session, SpecificationRegistry::builtin()?, config);
        let outcomes = if load {
            service.load_default_plugins()
        } else {
            Vec::new()
        };
        Ok((service, outcomes))
    }

    pub fn registry(&self) -> &SpecificationRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub(crate) fn same_as(&self, other: &Service) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` with exclusive access to the session.
    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut dyn Session) -> Result<R>) -> Result<R> {
        let mut guard = self
            .inner
            .session
            .lock()
            .map_err(|_| Error::transport("session lock poisoned by a panicking thread"))?;
        f(guard.as_mut())
    }

    /// Ask the server to load an operator plugin library.
    ///
    /// A path with a directory component is checked locally first and
    /// fails with [`Error::MissingPluginFile`] without contacting the server.
    /// Bare file names are resolved by the server.
    pub fn load_library(&self, request: &PluginRequest) -> Result<()> {
        let path = Path::new(&request.path);
        let has_dir = path
            .parent()
            .is_some_and(|p| !p.as_os_str().is_empty());
        if has_dir && !path.is_file() {
            return Err(Error::MissingPluginFile(path.to_path_buf()));
        }
        tracing::debug!(path = %request.path, name = %request.name, symbol = %request.symbol, "loading plugin");
        self.with_session(|s| s.load_plugin(request))
            .map_err(|e| Error::PluginLoad {
                path: request.path.clone(),
                source: Box::new(e),
            })
    }

    /// Load the MAPDL and mesh operator libraries, one outcome each.
    pub fn load_default_plugins(&self) -> Vec<PluginOutcome> {
        default_plugin_requests(self.inner.config.configuration, cfg!(unix))
            .into_iter()
            .map(|request| {
                let result = self.load_library(&request);
                if let Err(e) = &result {
                    tracing::warn!(plugin = %request.name, error = %e, "plugin not loaded");
                }
                PluginOutcome { request, result }
            })
            .collect()
    }

    /// Create an operator of the given kind or scripting name.
    pub fn operator(&self, name: &str) -> Result<Operator> {
        Operator::new(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackSession, SessionCall};

    fn service(session: LoopbackSession) -> Service {
        Service::new(
            session,
            SpecificationRegistry::builtin().unwrap(),
            ServiceConfig::default(),
        )
    }

    #[test]
    fn default_plugin_names() {
        let unix = default_plugin_requests(BuildConfiguration::Release, true);
        assert_eq!(unix[0].path, "libmapdlOperatorsCore.so");
        assert_eq!(unix[1].path, "libmeshOperatorsCore.so");
        assert_eq!(unix[1].name, "mesh_operators");
        assert_eq!(unix[0].symbol, "LoadOperators");

        let win = default_plugin_requests(BuildConfiguration::Release, false);
        assert_eq!(win[0].path, "mapdlOperatorsCore.dll");
        let win_debug = default_plugin_requests(BuildConfiguration::Debug, false);
        assert_eq!(win_debug[1].path, "meshOperatorsCoreD.dll");
    }

    #[test]
    fn missing_local_file_fails_before_any_remote_call() {
        let session = LoopbackSession::new();
        let log = session.call_log();
        let svc = service(session);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libnothere.so");
        let req = PluginRequest::new(path.to_str().unwrap(), "nothere");
        let err = svc.load_library(&req).unwrap_err();
        assert!(matches!(err, Error::MissingPluginFile(ref p) if *p == path));
        assert!(log.calls().is_empty());
    }

    #[test]
    fn existing_file_issues_one_remote_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libcustom.so");
        std::fs::write(&path, b"\x7fELF").unwrap();

        let mut session = LoopbackSession::new();
        session.register_plugin("libcustom.so", Vec::new());
        let log = session.call_log();
        let svc = service(session);

        let req = PluginRequest::new(path.to_str().unwrap(), "custom");
        svc.load_library(&req).unwrap();
        assert_eq!(log.calls(), vec![SessionCall::LoadPlugin(req)]);
    }

    #[test]
    fn remote_failure_is_wrapped() {
        let session = LoopbackSession::new();
        let svc = service(session);
        let req = PluginRequest::new("libunknown.so", "unknown");
        let err = svc.load_library(&req).unwrap_err();
        match err {
            Error::PluginLoad { path, source } => {
                assert_eq!(path, "libunknown.so");
                assert!(matches!(*source, Error::Transport(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_plugins_report_each_outcome() {
        let mut session = LoopbackSession::new();
        for req in default_plugin_requests(BuildConfiguration::Release, cfg!(unix)) {
            if req.name == "mesh_operators" {
                session.register_plugin(&req.path, Vec::new());
            }
        }
        let svc = service(session);
        let outcomes = svc.load_default_plugins();
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_loaded());
        assert_eq!(outcomes[0].request.name, "mapdl_operators");
        assert!(outcomes[1].is_loaded());
    }
}
