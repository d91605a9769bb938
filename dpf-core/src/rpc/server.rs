// MIT License
// Copyright 2023--present dpf-core developers

//! Cap'n Proto RPC server that dispatches incoming `Dpf` calls to a
//! [`LoopbackSession`].
//!
//! Every connection shares one session, so a handle returned by
//! `instantiate` on one connection can be bound, evaluated and released on
//! later ones. Failures are sent back as `Failed` exceptions carrying the
//! session error's message.

use std::cell::RefCell;
use std::net::{SocketAddr, ToSocketAddrs};
use std::rc::Rc;

use capnp::capability::Promise;
use capnp::Error as CapnpError;
use capnp_rpc::{pry, rpc_twoparty_capnp, twoparty, RpcSystem};
use futures::AsyncReadExt;

use crate::error::{Error, Result};
use crate::loopback::LoopbackSession;
use crate::rpc::convert;
use crate::rpc::schema::dpf;
use crate::session::{RemoteHandle, Session};

fn remote(e: Error) -> CapnpError {
    CapnpError::failed(e.to_string())
}

fn utf8(t: capnp::text::Reader<'_>) -> capnp::Result<&str> {
    t.to_str().map_err(|e| CapnpError::failed(e.to_string()))
}

struct DpfServer {
    session: Rc<RefCell<LoopbackSession>>,
}

impl dpf::Server for DpfServer {
    fn ping(&mut self, _: dpf::PingParams, _: dpf::PingResults) -> Promise<(), CapnpError> {
        Promise::ok(())
    }

    fn load_plugin(
        &mut self,
        params: dpf::LoadPluginParams,
        _: dpf::LoadPluginResults,
    ) -> Promise<(), CapnpError> {
        let request = pry!(convert::read_plugin_request(pry!(
            pry!(params.get()).get_request()
        )));
        tracing::debug!(path = %request.path, name = %request.name, "load plugin");
        pry!(self.session.borrow_mut().load_plugin(&request).map_err(remote));
        Promise::ok(())
    }

    fn instantiate(
        &mut self,
        params: dpf::InstantiateParams,
        mut results: dpf::InstantiateResults,
    ) -> Promise<(), CapnpError> {
        let params = pry!(params.get());
        let kind = pry!(utf8(pry!(params.get_kind_name())));
        let config = pry!(convert::read_config(pry!(params.get_config())));
        let handle = pry!(self
            .session
            .borrow_mut()
            .instantiate(kind, &config)
            .map_err(remote));
        tracing::debug!(kind, %handle, "instantiated");
        results.get().set_handle(handle.0);
        Promise::ok(())
    }

    fn bind_input(
        &mut self,
        params: dpf::BindInputParams,
        _: dpf::BindInputResults,
    ) -> Promise<(), CapnpError> {
        let params = pry!(params.get());
        let input = pry!(convert::read_input(pry!(params.get_input())));
        pry!(self
            .session
            .borrow_mut()
            .bind_input(RemoteHandle(params.get_handle()), params.get_pin(), input)
            .map_err(remote));
        Promise::ok(())
    }

    fn evaluate(
        &mut self,
        params: dpf::EvaluateParams,
        _: dpf::EvaluateResults,
    ) -> Promise<(), CapnpError> {
        let handle = RemoteHandle(pry!(params.get()).get_handle());
        pry!(self.session.borrow_mut().evaluate(handle).map_err(remote));
        Promise::ok(())
    }

    fn fetch_output(
        &mut self,
        params: dpf::FetchOutputParams,
        mut results: dpf::FetchOutputResults,
    ) -> Promise<(), CapnpError> {
        let params = pry!(params.get());
        let expected = pry!(convert::read_type(pry!(utf8(pry!(params.get_expected())))));
        let value = pry!(self
            .session
            .borrow_mut()
            .fetch_output(RemoteHandle(params.get_handle()), params.get_pin(), expected)
            .map_err(remote));
        pry!(convert::write_value(&value, results.get().init_value()));
        Promise::ok(())
    }

    fn release(
        &mut self,
        params: dpf::ReleaseParams,
        _: dpf::ReleaseResults,
    ) -> Promise<(), CapnpError> {
        let handle = RemoteHandle(pry!(params.get()).get_handle());
        pry!(self.session.borrow_mut().release(handle).map_err(remote));
        Promise::ok(())
    }
}

/// A bound listener serving one [`LoopbackSession`].
///
/// Binding is separate from [`RpcServer::run`] so callers can learn the
/// actual port (when binding port 0) before the blocking loop starts.
#[derive(Debug)]
pub struct RpcServer {
    listener: std::net::TcpListener,
}

impl RpcServer {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until accepting fails.
    ///
    /// This function blocks the current thread. It creates its own
    /// single-threaded tokio runtime.
    pub fn run(self, session: LoopbackSession) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let local = tokio::task::LocalSet::new();
        local.block_on(&runtime, serve(self.listener, session))
    }
}

async fn serve(listener: std::net::TcpListener, session: LoopbackSession) -> Result<()> {
    let listener = tokio::net::TcpListener::from_std(listener)?;
    tracing::info!(addr = %listener.local_addr()?, "DPF server listening");
    let session = Rc::new(RefCell::new(session));

    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        tracing::debug!(%peer, "accepted connection");

        let client: dpf::Client = capnp_rpc::new_client(DpfServer {
            session: Rc::clone(&session),
        });

        let (reader, writer) =
            tokio_util::compat::TokioAsyncReadCompatExt::compat(stream).split();

        let network = twoparty::VatNetwork::new(
            futures::io::BufReader::new(reader),
            futures::io::BufWriter::new(writer),
            rpc_twoparty_capnp::Side::Server,
            Default::default(),
        );

        let rpc_system = RpcSystem::new(Box::new(network), Some(client.client));
        tokio::task::spawn_local(async move {
            if let Err(e) = rpc_system.await {
                tracing::debug!(%peer, error = %e, "connection closed");
            }
        });
    }
}
