use super::OutputTransport;
use crate::render::Bitmap;
use anyhow::{Context, Result, ensure};
use log::{debug, error, info};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot, watch};
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

/// ZeroMQ address of a companion server, `tcp://host:port` or `ipc://path`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    /// Bare `host:port` addresses are taken as tcp.
    pub fn parse(address: &str) -> Self {
        if address.contains("://") {
            Self(address.to_string())
        } else {
            Self(format!("tcp://{address}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One request/acknowledge channel to the display.
pub struct DisplayLink {
    socket: ReqSocket,
    ack_timeout: Duration,
}

impl DisplayLink {
    pub const ACK: &[u8] = b"a";

    /// Connecting is bounded by `ack_timeout` too.
    pub async fn connect(endpoint: &Endpoint, ack_timeout: Duration) -> Result<Self> {
        let mut socket = ReqSocket::new();

        tokio::time::timeout(ack_timeout, socket.connect(endpoint.as_str()))
            .await
            .context("timed out")
            .and_then(|connected| connected.map_err(anyhow::Error::from))
            .context(format!("failed to connect display at {endpoint}"))?;

        debug!("connected display at {endpoint}");
        Ok(Self {
            socket,
            ack_timeout,
        })
    }

    /// Sends one flattened frame and waits for its acknowledgement.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.socket
            .send(ZmqMessage::from(frame.to_vec()))
            .await
            .context("failed to send frame")?;

        let reply = tokio::time::timeout(self.ack_timeout, self.socket.recv())
            .await
            .context("timed out waiting for display acknowledgement")?
            .context("failed to read display acknowledgement")?;

        let ack = reply.get(0).map(|part| part.to_vec()).unwrap_or_default();
        ensure!(
            ack == Self::ACK,
            "unexpected display acknowledgement {ack:02x?}"
        );

        Ok(())
    }
}

type ShutdownReply = oneshot::Sender<Result<()>>;

/// Pushes frames to a remote display from a dedicated worker task.
///
/// `publish` only replaces the pending frame; the worker always sends the
/// newest one once the previous frame was acknowledged.
pub struct PushTransport {
    frames: watch::Sender<Option<Vec<u8>>>,
    stop: Mutex<Option<oneshot::Sender<ShutdownReply>>>,
}

impl PushTransport {
    /// Connects the display and starts the worker. Failing to reach the
    /// display here is fatal for the caller.
    pub async fn connect(endpoint: Endpoint, ack_timeout: Duration, pixel_count: usize) -> Result<Self> {
        let link = DisplayLink::connect(&endpoint, ack_timeout).await?;
        info!("pushing frames to {endpoint}");

        let (frames, rx) = watch::channel(None);
        let (stop, stop_rx) = oneshot::channel();

        let worker = Worker {
            endpoint,
            ack_timeout,
            link: Some(link),
            blank: vec![0u8; pixel_count],
        };
        tokio::spawn(worker.run(rx, stop_rx));

        Ok(Self {
            frames,
            stop: Mutex::new(Some(stop)),
        })
    }

    /// Clears the display and stops the worker.
    pub async fn shutdown(&self) -> Result<()> {
        let stop = self
            .stop
            .lock()
            .await
            .take()
            .context("display transport already shut down")?;

        let (reply, done) = oneshot::channel();
        ensure!(stop.send(reply).is_ok(), "display worker not running");

        done.await.context("display worker stopped unexpectedly")?
    }
}

impl OutputTransport for PushTransport {
    fn publish(&self, frame: &Bitmap) {
        self.frames.send_replace(Some(frame.flattened()));
    }
}

struct Worker {
    endpoint: Endpoint,
    ack_timeout: Duration,
    link: Option<DisplayLink>,
    blank: Vec<u8>,
}

impl Worker {
    async fn run(
        mut self,
        mut frames: watch::Receiver<Option<Vec<u8>>>,
        mut stop: oneshot::Receiver<ShutdownReply>,
    ) {
        loop {
            tokio::select! {
                reply = &mut stop => {
                    let Ok(reply) = reply else {
                        return;
                    };
                    info!("clearing display");
                    let blank = std::mem::take(&mut self.blank);
                    let _ = reply.send(self.deliver(&blank).await);
                    return;
                }
                changed = frames.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let frame = frames.borrow_and_update().clone();
                    if let Some(frame) = frame {
                        if let Err(e) = self.deliver(&frame).await {
                            error!("failed to push frame: {e:#}");
                        }
                    }
                }
            }
        }
    }

    /// Sends `frame`, reconnecting first if the previous exchange failed.
    async fn deliver(&mut self, frame: &[u8]) -> Result<()> {
        let mut link = match self.link.take() {
            Some(link) => link,
            None => DisplayLink::connect(&self.endpoint, self.ack_timeout).await?,
        };

        link.send_frame(frame).await?;
        self.link = Some(link);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::JoinHandle;
    use zeromq::RepSocket;

    /// Binds a display on a free port that answers the first frame with
    /// `reply`, or never answers when `reply` is `None`.
    async fn display(reply: Option<&'static str>) -> (Endpoint, JoinHandle<Vec<u8>>) {
        let mut socket = RepSocket::new();
        let bound = socket.bind("tcp://127.0.0.1:0").await.unwrap();

        let peer = tokio::spawn(async move {
            let request = socket.recv().await.unwrap();
            match reply {
                Some(reply) => socket.send(ZmqMessage::from(reply.to_string())).await.unwrap(),
                None => tokio::time::sleep(Duration::from_secs(1)).await,
            }
            // keep the socket open until the client has read the reply
            tokio::time::sleep(Duration::from_millis(100)).await;
            request.get(0).unwrap().to_vec()
        });

        (Endpoint::parse(&bound.to_string()), peer)
    }

    #[test]
    fn endpoint_forms() {
        assert_eq!(
            Endpoint::parse("127.0.0.1:5555").as_str(),
            "tcp://127.0.0.1:5555"
        );
        assert_eq!(
            Endpoint::parse("tcp://localhost:5555").as_str(),
            "tcp://localhost:5555"
        );
        assert_eq!(
            Endpoint::parse("ipc:///run/display.sock").to_string(),
            "ipc:///run/display.sock"
        );
    }

    mod link {
        use super::*;

        #[tokio::test]
        async fn frame_is_acknowledged() {
            let (endpoint, peer) = display(Some("a")).await;
            let mut link = DisplayLink::connect(&endpoint, Duration::from_secs(1))
                .await
                .unwrap();

            link.send_frame(&[0x00, 0xFF, 0xFF, 0x00]).await.unwrap();
            assert_eq!(peer.await.unwrap(), [0x00, 0xFF, 0xFF, 0x00]);
        }

        #[tokio::test]
        async fn unexpected_ack_is_an_error() {
            let (endpoint, _peer) = display(Some("x")).await;
            let mut link = DisplayLink::connect(&endpoint, Duration::from_secs(1))
                .await
                .unwrap();

            let err = link.send_frame(&[0, 0]).await.unwrap_err();
            assert!(format!("{err:#}").contains("unexpected display acknowledgement"));
        }

        #[tokio::test]
        async fn missing_ack_times_out() {
            let (endpoint, _peer) = display(None).await;
            let mut link = DisplayLink::connect(&endpoint, Duration::from_millis(50))
                .await
                .unwrap();

            let err = link.send_frame(&[0, 0]).await.unwrap_err();
            assert!(format!("{err:#}").contains("timed out"));
        }

        #[tokio::test]
        async fn unreachable_display_is_bounded_by_timeout() {
            let endpoint = Endpoint::parse("127.0.0.1:1");
            let started = std::time::Instant::now();

            let err = DisplayLink::connect(&endpoint, Duration::from_millis(200))
                .await
                .err()
                .unwrap();

            assert!(format!("{err:#}").contains("failed to connect display at tcp://127.0.0.1:1"));
            assert!(started.elapsed() < Duration::from_secs(2));
        }
    }
}
