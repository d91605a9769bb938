// MIT License
// Copyright 2023--present dpf-core developers

//! Blocking [`Session`] over Cap'n Proto RPC.
//!
//! `capnp_rpc::RpcSystem` is `!Send`, so one worker thread owns the
//! connection on a `LocalSet` for the lifetime of the session. Requests are
//! queued to it as jobs and answered over a oneshot channel, which lets
//! operator handles (and the C API) call the session synchronously.

use std::future::Future;
use std::pin::Pin;
use std::thread::JoinHandle;
use std::time::Duration;

use capnp_rpc::{rpc_twoparty_capnp, twoparty, RpcSystem};
use futures::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};

use crate::config::OperatorConfig;
use crate::error::{Error, Result};
use crate::rpc::convert;
use crate::rpc::schema::dpf;
use crate::session::{PluginRequest, RemoteHandle, Session, SessionInput};
use crate::types::{SemanticType, Value};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

type Job = Box<dyn FnOnce(dpf::Client) -> Pin<Box<dyn Future<Output = ()>>> + Send>;

/// RPC session connected to a remote DPF server.
pub struct RpcSession {
    addr: String,
    jobs: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RpcSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcSession").field("addr", &self.addr).finish()
    }
}

async fn open(addr: &str) -> Result<dpf::Client> {
    let stream = tokio::net::TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;

    let (reader, writer) = tokio_util::compat::TokioAsyncReadCompatExt::compat(stream).split();

    let network = twoparty::VatNetwork::new(
        futures::io::BufReader::new(reader),
        futures::io::BufWriter::new(writer),
        rpc_twoparty_capnp::Side::Client,
        Default::default(),
    );

    let mut rpc_system = RpcSystem::new(Box::new(network), None);
    let client: dpf::Client = rpc_system.bootstrap(rpc_twoparty_capnp::Side::Server);

    tokio::task::spawn_local(async move {
        if let Err(e) = rpc_system.await {
            tracing::debug!(error = %e, "rpc connection closed");
        }
    });

    Ok(client)
}

async fn ping(client: &dpf::Client) -> Result<()> {
    client.ping_request().send().promise.await?;
    Ok(())
}

/// Open a connection, retrying refused attempts, and wait for a ping reply.
async fn probe(addr: &str) -> Result<dpf::Client> {
    loop {
        match open(addr).await {
            Ok(client) => {
                ping(&client).await?;
                return Ok(client);
            }
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                tracing::trace!(%addr, "connection refused, retrying");
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn closed() -> Error {
    Error::Transport("rpc connection closed".into())
}

impl RpcSession {
    /// Connect to `host:port`, waiting until the server answers a ping.
    ///
    /// Refused connections are retried until `timeout` expires, which covers
    /// a server that is still starting up. Any failure is reported as
    /// [`Error::Connection`].
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let (ready, connected) = oneshot::channel::<std::result::Result<(), String>>();

        let worker_addr = addr.clone();
        let worker = std::thread::Builder::new()
            .name("dpf-rpc".into())
            .spawn(move || {
                let local = tokio::task::LocalSet::new();
                local.block_on(&runtime, async move {
                    let client = match tokio::time::timeout(timeout, probe(&worker_addr)).await {
                        Ok(Ok(client)) => client,
                        Ok(Err(e)) => {
                            let _ = ready.send(Err(e.to_string()));
                            return;
                        }
                        Err(_) => {
                            let _ = ready.send(Err("timed out".into()));
                            return;
                        }
                    };
                    let _ = ready.send(Ok(()));
                    while let Some(job) = queue.recv().await {
                        job(client.clone()).await;
                    }
                    tracing::debug!(addr = %worker_addr, "rpc session closed");
                });
            })?;

        let reason = match connected.blocking_recv() {
            Ok(Ok(())) => {
                tracing::debug!(%addr, "connected to DPF server");
                return Ok(Self {
                    addr,
                    jobs: Some(jobs),
                    worker: Some(worker),
                });
            }
            Ok(Err(reason)) => reason,
            Err(_) => "rpc worker stopped".to_string(),
        };
        let _ = worker.join();
        Err(Error::Connection {
            endpoint: addr,
            timeout,
            reason,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Run one request on the session's connection and wait for its result.
    fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(dpf::Client) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + 'static,
        T: Send + 'static,
    {
        let jobs = self.jobs.as_ref().ok_or_else(closed)?;
        let (reply, answer) = oneshot::channel();
        let job: Job = Box::new(move |client| {
            Box::pin(async move {
                let _ = reply.send(f(client).await);
            })
        });
        jobs.send(job).map_err(|_| closed())?;
        answer.blocking_recv().map_err(|_| closed())?
    }
}

impl Drop for RpcSession {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop and the connection with it.
        drop(self.jobs.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Session for RpcSession {
    fn load_plugin(&mut self, request: &PluginRequest) -> Result<()> {
        let request = request.clone();
        self.call(move |client| async move {
            let mut req = client.load_plugin_request();
            convert::write_plugin_request(&request, req.get().init_request());
            req.send().promise.await?;
            Ok(())
        })
    }

    fn instantiate(&mut self, kind_name: &str, config: &OperatorConfig) -> Result<RemoteHandle> {
        let n_options = convert::len(config.iter().count())?;
        let kind_name = kind_name.to_string();
        let config = config.clone();
        self.call(move |client| async move {
            let mut req = client.instantiate_request();
            {
                let mut params = req.get();
                params.set_kind_name(kind_name.as_str());
                convert::write_config(&config, params.init_config(n_options))?;
            }
            let response = req.send().promise.await?;
            Ok(RemoteHandle(response.get()?.get_handle()))
        })
    }

    fn bind_input(&mut self, handle: RemoteHandle, pin: u32, input: SessionInput) -> Result<()> {
        self.call(move |client| async move {
            let mut req = client.bind_input_request();
            {
                let mut params = req.get();
                params.set_handle(handle.0);
                params.set_pin(pin);
                convert::write_input(&input, params.init_input())?;
            }
            req.send().promise.await?;
            Ok(())
        })
    }

    fn evaluate(&mut self, handle: RemoteHandle) -> Result<()> {
        self.call(move |client| async move {
            let mut req = client.evaluate_request();
            req.get().set_handle(handle.0);
            req.send().promise.await?;
            Ok(())
        })
    }

    fn fetch_output(
        &mut self,
        handle: RemoteHandle,
        pin: u32,
        expected: SemanticType,
    ) -> Result<Value> {
        self.call(move |client| async move {
            let mut req = client.fetch_output_request();
            {
                let mut params = req.get();
                params.set_handle(handle.0);
                params.set_pin(pin);
                params.set_expected(expected.tag());
            }
            let response = req.send().promise.await?;
            let value = convert::read_value(response.get()?.get_value()?)?;
            Ok(value)
        })
    }

    fn release(&mut self, handle: RemoteHandle) -> Result<()> {
        self.call(move |client| async move {
            let mut req = client.release_request();
            req.get().set_handle(handle.0);
            req.send().promise.await?;
            Ok(())
        })
    }
}
