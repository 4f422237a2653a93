use std::process;
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::{Mutex, broadcast};

use panel_core::proto::*;
use panel_ipc::framing::{self, FramedStream};

use crate::backup;
use crate::config::PanelConfig;
use crate::supervisor::{self, EventBus, LogStore, ServerState, SharedState};

pub async fn serve(
    listener: UnixListener,
    config: PanelConfig,
    logs: LogStore,
) -> std::io::Result<()> {
    let events = EventBus::new();
    let state: SharedState = Arc::new(Mutex::new(ServerState::new(logs, events)));
    let start_ms = supervisor::now_millis();
    let config = Arc::new(config);

    loop {
        let (stream, _addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            let _ = handle_conn(stream, config, state, start_ms).await;
        });
    }
}

/// Per-connection push stream installed by a Subscribe request.
struct Subscription {
    topics: Vec<Topic>,
    logs_rx: Option<broadcast::Receiver<LogLine>>,
    events_rx: Option<broadcast::Receiver<Event>>,
}

impl Subscription {
    fn wants(&self, event: &Event) -> bool {
        match event {
            Event::Log(_) => self.topics.contains(&Topic::Logs),
            Event::Status(_) => self.topics.contains(&Topic::Status),
            Event::RestoreProgress { .. }
            | Event::RestoreCompleted {}
            | Event::RestoreError { .. } => self.topics.contains(&Topic::Restore),
        }
    }

    /// Next event to push, skipping lagged gaps; `None` once every source
    /// channel has closed.
    async fn next(&mut self) -> Option<Event> {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            if self.logs_rx.is_none() && self.events_rx.is_none() {
                return None;
            }
            tokio::select! {
                line = recv_or_pending(&mut self.logs_rx) => match line {
                    Ok(line) => return Some(Event::Log(line)),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => self.logs_rx = None,
                },
                event = recv_or_pending(&mut self.events_rx) => match event {
                    Ok(event) => {
                        if self.wants(&event) {
                            return Some(event);
                        }
                        continue;
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => self.events_rx = None,
                },
            }
        }
    }
}

async fn recv_or_pending<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<Event> {
    match subscription {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

async fn handle_conn(
    stream: tokio::net::UnixStream,
    config: Arc<PanelConfig>,
    state: SharedState,
    daemon_start_ms: u64,
) -> std::io::Result<()> {
    let mut framed = framing::framed(stream);
    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            req = framing::read_request(&mut framed) => {
                let Some(env) = req? else { break };
                dispatch(env, &mut framed, &config, &state, daemon_start_ms, &mut subscription).await?;
            }
            event = next_event(&mut subscription) => {
                match event {
                    Some(event) => {
                        framing::send_outbound(&mut framed, &Outbound::Event(event)).await?;
                    }
                    None => subscription = None,
                }
            }
        }
    }

    Ok(())
}

async fn dispatch(
    env: Envelope<Request>,
    framed: &mut FramedStream,
    config: &PanelConfig,
    state: &SharedState,
    daemon_start_ms: u64,
    subscription: &mut Option<Subscription>,
) -> std::io::Result<()> {
    let req_id = env.id;

    match env.payload {
        Request::Shutdown {} => {
            respond(framed, req_id, Response::ShutdownAck {}).await?;
            process::exit(0);
        }

        Request::Ping { .. } => {
            let resp = Response::Pong {
                daemon_version: env!("CARGO_PKG_VERSION").to_string(),
                protocol_version: panel_core::PROTOCOL_VERSION,
            };
            respond(framed, req_id, resp).await
        }

        Request::Status {} => {
            let (daemon, server) = supervisor::build_status(daemon_start_ms, state).await;
            respond(framed, req_id, Response::Status { daemon, server }).await
        }

        Request::Start {} => {
            let result = supervisor::start_server(config, state.clone()).await;
            reply_result(framed, req_id, result).await
        }

        Request::Stop { force } => {
            let result = supervisor::stop_server(force, state.clone()).await;
            reply_result(framed, req_id, result).await
        }

        Request::Command { line } => {
            let result = supervisor::send_command(state, &line).await;
            reply_result(framed, req_id, result).await
        }

        Request::LogsTail { lines } => {
            let logs = {
                let guard = state.lock().await;
                guard.logs.clone()
            };
            let total = logs.len();
            let tail = logs.tail(lines);
            let truncated = total > tail.len();
            respond(framed, req_id, Response::LogsTail { lines: tail, truncated }).await
        }

        Request::Subscribe { topics, send_initial_status } => {
            let (logs, events) = {
                let guard = state.lock().await;
                (guard.logs.clone(), guard.events.clone())
            };
            let logs_rx = topics.contains(&Topic::Logs).then(|| logs.subscribe());
            let events_rx = (topics.contains(&Topic::Status)
                || topics.contains(&Topic::Restore))
            .then(|| events.subscribe());
            *subscription = Some(Subscription {
                topics: topics.clone(),
                logs_rx,
                events_rx,
            });
            respond(framed, req_id, Response::Subscribed { topics }).await?;

            if send_initial_status {
                let (_, server) = supervisor::build_status(daemon_start_ms, state).await;
                framing::send_outbound(framed, &Outbound::Event(Event::Status(server))).await?;
            }
            Ok(())
        }

        Request::Unsubscribe {} => {
            *subscription = None;
            respond(framed, req_id, Response::Unsubscribed {}).await
        }

        Request::BackupsList {} => {
            let result = backup::list_backups(config).await;
            reply_result(framed, req_id, result).await
        }

        Request::BackupCreate {} => {
            let result = backup::create_backup(state).await;
            reply_result(framed, req_id, result).await
        }

        Request::BackupRestore { name, tier } => {
            let result = backup::start_restore(config, state, &name, &tier).await;
            reply_result(framed, req_id, result).await
        }
    }
}

async fn respond(
    framed: &mut FramedStream,
    req_id: RequestId,
    payload: Response,
) -> std::io::Result<()> {
    let out = Outbound::Response(Envelope { id: req_id, payload });
    framing::send_outbound(framed, &out).await
}

async fn reply_result(
    framed: &mut FramedStream,
    req_id: RequestId,
    result: Result<Response, RpcError>,
) -> std::io::Result<()> {
    match result {
        Ok(resp) => respond(framed, req_id, resp).await,
        Err(err) => respond(framed, req_id, Response::Error(err)).await,
    }
}
