//! Server-side dispatcher ([`Skeleton`]).
//!
//! Generalizes the teacher's `srv::dispatch`/`srv_async_tcp` pair: an
//! accept task spawned once by `start()`, and one service task per
//! accepted connection (exactly one call per connection, per spec
//! §4.2), tracked in a [`tokio::task::JoinSet`] so `stop()` can wait for
//! every in-flight call to drain before invoking `stopped()`.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;

use crate::error::RemoteError;
use crate::rmi::descriptor::InterfaceDescriptor;
use crate::serialize::{self, Reply, Request};

/// The object a [`Skeleton`] dispatches calls to. One implementation
/// per remote interface (`NamingInterface`, `StorageClientInterface`,
/// ...); the skeleton itself does the method-name/signature lookup
/// against [`Dispatch::descriptor`] before ever calling
/// [`Dispatch::dispatch`], so implementors only need to handle methods
/// they already know exist.
#[async_trait]
pub trait Dispatch: Send + Sync {
    fn descriptor(&self) -> InterfaceDescriptor;

    /// Invokes `method` with the bincode-encoded argument tuple `args`
    /// and produces a reply. Implementations never need to synthesize
    /// a `NoSuchMethod` reply themselves; the skeleton has already
    /// verified `method` is valid before calling this.
    async fn dispatch(&self, method: &str, args: &[u8]) -> Reply;
}

/// Overridable skeleton lifecycle hooks. The default implementation
/// logs via the `log` facade, matching the teacher's `info!`/`error!`
/// usage in `srv.rs`.
pub trait SkeletonHooks: Send + Sync {
    /// Called when accepting or reading a frame fails outside of any
    /// single call's dispatch. Return `true` to keep listening, `false`
    /// to stop the skeleton with this error as the `stopped` cause.
    fn listen_error(&self, e: &RemoteError) -> bool {
        warn!("listen error: {e}");
        true
    }

    /// Called once per call that fails for transport/serialization
    /// reasons on the server side. Never called for `NoSuchMethod` or
    /// for exceptions the server method itself raised.
    fn service_error(&self, e: &RemoteError) {
        error!("service error: {e}");
    }

    /// Called exactly once when the skeleton has fully stopped:
    /// `cause` is `None` on a clean `stop()`, or the fatal listener
    /// error otherwise.
    fn stopped(&self, cause: Option<RemoteError>) {
        match cause {
            None => info!("skeleton stopped cleanly"),
            Some(e) => error!("skeleton stopped: {e}"),
        }
    }
}

/// The default hooks: log and keep going.
pub struct LoggingHooks;
impl SkeletonHooks for LoggingHooks {}

struct Inner {
    listening: bool,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    accept_handle: Option<tokio::task::JoinHandle<()>>,
}

/// Server-side listener/dispatcher for one remote interface.
pub struct Skeleton<D: Dispatch + 'static> {
    descriptor: InterfaceDescriptor,
    server: Arc<D>,
    hooks: Arc<dyn SkeletonHooks>,
    requested_addr: SocketAddr,
    inner: Mutex<Inner>,
}

enum AcceptOutcome {
    Shutdown,
    Fatal(RemoteError),
}

impl<D: Dispatch + 'static> Skeleton<D> {
    /// Constructs a skeleton for `server`, to be bound at `bind_addr`
    /// (port `0` picks an ephemeral port). Fails with
    /// `RemoteError::BadInterface` if `D`'s interface has any method
    /// not declaring the transport error.
    pub fn new(
        server: D,
        bind_addr: SocketAddr,
        hooks: Arc<dyn SkeletonHooks>,
    ) -> Result<Arc<Skeleton<D>>, RemoteError> {
        let descriptor = server.descriptor();
        descriptor.validate()?;
        Ok(Arc::new(Skeleton {
            descriptor,
            server: Arc::new(server),
            hooks,
            requested_addr: bind_addr,
            inner: Mutex::new(Inner {
                listening: false,
                local_addr: None,
                shutdown_tx: None,
                accept_handle: None,
            }),
        }))
    }

    pub fn with_default_hooks(server: D, bind_addr: SocketAddr) -> Result<Arc<Skeleton<D>>, RemoteError> {
        Self::new(server, bind_addr, Arc::new(LoggingHooks))
    }

    /// Binds the listener and spawns the accept task. Fails if already
    /// started, or if the bind fails.
    pub async fn start(self: &Arc<Self>) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().await;
        if inner.listening {
            return Err(RemoteError::IllegalState("skeleton already started".into()));
        }

        let listener = TcpListener::bind(self.requested_addr)
            .await
            .map_err(RemoteError::from)?;
        let local_addr = listener.local_addr().map_err(RemoteError::from)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let this = Arc::clone(self);
        let accept_handle = tokio::spawn(async move {
            this.accept_loop(listener, shutdown_rx).await;
        });

        inner.listening = true;
        inner.local_addr = Some(local_addr);
        inner.shutdown_tx = Some(shutdown_tx);
        inner.accept_handle = Some(accept_handle);
        info!("skeleton for {} serving on {}", self.descriptor.name, local_addr);
        Ok(())
    }

    /// `true` while the accept task is running.
    pub async fn is_listening(&self) -> bool {
        self.inner.lock().await.listening
    }

    /// The bound address, once `start()` has succeeded.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().await.local_addr
    }

    /// Idempotent: closes the listener, waits for every in-flight
    /// service task to finish its current call, then invokes
    /// `stopped(None)` (the fatal-error path invokes it from inside the
    /// accept loop itself, since that's where the cause is known).
    pub async fn stop(&self) {
        let (accept_handle, shutdown_tx) = {
            let mut inner = self.inner.lock().await;
            if !inner.listening {
                return;
            }
            inner.listening = false;
            (inner.accept_handle.take(), inner.shutdown_tx.take())
        };
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }
        if let Some(handle) = accept_handle {
            let _ = handle.await;
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut tasks: JoinSet<()> = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown_rx => break AcceptOutcome::Shutdown,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _peer)) => {
                            let server = Arc::clone(&self.server);
                            let hooks = Arc::clone(&self.hooks);
                            let descriptor = self.descriptor;
                            tasks.spawn(async move {
                                Self::service_connection(stream, server, hooks, descriptor).await;
                            });
                        }
                        Err(e) => {
                            let err = RemoteError::from(e);
                            if self.hooks.listen_error(&err) {
                                continue;
                            }
                            break AcceptOutcome::Fatal(err);
                        }
                    }
                }
            }
        };
        drop(listener);

        while tasks.join_next().await.is_some() {}

        let cause = match outcome {
            AcceptOutcome::Shutdown => None,
            AcceptOutcome::Fatal(e) => Some(e),
        };
        self.hooks.stopped(cause);
    }

    async fn service_connection(
        stream: TcpStream,
        server: Arc<D>,
        hooks: Arc<dyn SkeletonHooks>,
        descriptor: InterfaceDescriptor,
    ) {
        let (read_half, write_half) = stream.into_split();
        let mut reader = serialize::framed_read(read_half);

        let frame = match reader.next().await {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                hooks.service_error(&RemoteError::from(e));
                return;
            }
            None => return,
        };

        let request: Request = match serialize::decode_request(&frame) {
            Ok(r) => r,
            Err(e) => {
                hooks.service_error(&e);
                return;
            }
        };

        let reply = match descriptor.find(&request.method, &request.params) {
            Some(_) => server.dispatch(&request.method, &request.args).await,
            None => Reply::err(&RemoteError::NoSuchMethod(request.method.clone())),
        };

        let encoded = match serialize::encode_reply(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                hooks.service_error(&e);
                return;
            }
        };

        let mut writer = serialize::framed_write(write_half);
        if let Err(e) = writer.send(Bytes::from(encoded)).await {
            hooks.service_error(&RemoteError::from(e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rmi::descriptor::MethodDescriptor;
    use crate::rmi::stub::Stub;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct EchoMarker;
    const ECHO_DESCRIPTOR: InterfaceDescriptor = InterfaceDescriptor {
        name: "Echo",
        methods: &[
            MethodDescriptor { name: "echo", params: &["bool"], declares_transport_error: true },
            MethodDescriptor { name: "rendezvous", params: &[], declares_transport_error: true },
        ],
    };
    impl crate::rmi::descriptor::RemoteInterface for EchoMarker {
        fn descriptor() -> InterfaceDescriptor {
            ECHO_DESCRIPTOR
        }
    }

    struct EchoServer {
        rendezvous: tokio::sync::Barrier,
    }

    #[async_trait]
    impl Dispatch for EchoServer {
        fn descriptor(&self) -> InterfaceDescriptor {
            ECHO_DESCRIPTOR
        }

        async fn dispatch(&self, method: &str, args: &[u8]) -> Reply {
            match method {
                "echo" => {
                    let fail: bool = bincode::deserialize(args).unwrap();
                    if fail {
                        Reply::err(&RemoteError::FileNotFound)
                    } else {
                        Reply::ok(&()).unwrap()
                    }
                }
                "rendezvous" => {
                    self.rendezvous.wait().await;
                    Reply::ok(&()).unwrap()
                }
                _ => unreachable!("validated by the skeleton before dispatch"),
            }
        }
    }

    #[derive(Serialize, Deserialize)]
    struct NoArgs;

    #[tokio::test]
    async fn scenario_s1_call_transparency_and_exception_transparency() {
        let server = EchoServer { rendezvous: tokio::sync::Barrier::new(2) };
        let skeleton = Skeleton::with_default_hooks(server, "127.0.0.1:0".parse().unwrap()).unwrap();
        skeleton.start().await.unwrap();
        let addr = skeleton.local_addr().await.unwrap();

        let stub: Stub<EchoMarker> = Stub::new(addr).unwrap();
        let ok: () = stub.invoke("echo", &["bool"], &(false,)).await.unwrap();
        let _ = ok;
        let err = stub
            .invoke::<_, ()>("echo", &["bool"], &(true,))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::FileNotFound);

        skeleton.stop().await;
    }

    #[tokio::test]
    async fn scenario_s6_stub_to_closed_skeleton_is_transport_error() {
        let server = EchoServer { rendezvous: tokio::sync::Barrier::new(2) };
        let skeleton = Skeleton::with_default_hooks(server, "127.0.0.1:0".parse().unwrap()).unwrap();
        skeleton.start().await.unwrap();
        let addr = skeleton.local_addr().await.unwrap();
        skeleton.stop().await;

        let stub: Stub<EchoMarker> = Stub::new(addr).unwrap();
        let err = stub.invoke::<_, ()>("echo", &["bool"], &(false,)).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn unknown_method_gets_no_such_method_not_service_error() {
        struct Flagged(AtomicBool);
        impl SkeletonHooks for Flagged {
            fn service_error(&self, _e: &RemoteError) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let server = EchoServer { rendezvous: tokio::sync::Barrier::new(2) };
        let hooks = Arc::new(Flagged(AtomicBool::new(false)));
        let skeleton = Skeleton::new(server, "127.0.0.1:0".parse().unwrap(), hooks.clone()).unwrap();
        skeleton.start().await.unwrap();
        let addr = skeleton.local_addr().await.unwrap();

        let stub: Stub<EchoMarker> = Stub::new(addr).unwrap();
        let err = stub.invoke::<_, ()>("missing", &[], &NoArgs).await.unwrap_err();
        assert!(matches!(err, RemoteError::NoSuchMethod(_)));
        assert!(!hooks.0.load(Ordering::SeqCst));

        skeleton.stop().await;
    }

    #[tokio::test]
    async fn scenario_s2_two_concurrent_calls_rendezvous() {
        let server = EchoServer { rendezvous: tokio::sync::Barrier::new(2) };
        let skeleton = Skeleton::with_default_hooks(server, "127.0.0.1:0".parse().unwrap()).unwrap();
        skeleton.start().await.unwrap();
        let addr = skeleton.local_addr().await.unwrap();

        let stub1: Stub<EchoMarker> = Stub::new(addr).unwrap();
        let stub2: Stub<EchoMarker> = Stub::new(addr).unwrap();

        let (r1, r2) = tokio::join!(
            stub1.invoke::<_, ()>("rendezvous", &[], &NoArgs),
            stub2.invoke::<_, ()>("rendezvous", &[], &NoArgs),
        );
        r1.unwrap();
        r2.unwrap();

        skeleton.stop().await;
    }
}
