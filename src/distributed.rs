use crate::common_util::hold;
use crate::error::Error;
use crate::meta::Params;
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteTask {
    pub task_id: usize,
    pub candidate: serde_json::Value,
    pub params: Params,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteResult {
    pub task_id: usize,
    pub value: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolRequest {
    Init { command: serde_json::Value },
    Batch { tasks: Vec<RemoteTask> },
    Close,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolResponse {
    Ack,
    Results { results: Vec<RemoteResult> },
    Refused { message: String },
}

pub trait WorkerPoolClient: Send {
    fn submit_init_command(&mut self, command: &serde_json::Value) -> Result<(), Error>;
    fn submit_batch(&mut self, tasks: &[RemoteTask]) -> Result<Vec<RemoteResult>, Error>;
    fn close(&mut self) -> Result<(), Error>;
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

pub struct TcpPoolClient {
    host: String,
    port: u16,
    connection: Option<Connection>,
    init_sent: bool,
}

impl TcpPoolClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connection: None,
            init_sent: false,
        }
    }

    fn connection(&mut self) -> Result<&mut Connection, Error> {
        if self.connection.is_none() {
            let stream = TcpStream::connect((self.host.as_str(), self.port))?;
            let reader = BufReader::new(stream.try_clone()?);
            self.connection = Some(Connection {
                reader,
                writer: stream,
            });
            debug!("connected to worker pool at {}:{}", self.host, self.port);
        }
        Ok(self.connection.as_mut().expect("connection just created"))
    }

    fn roundtrip(&mut self, request: &PoolRequest) -> Result<PoolResponse, Error> {
        let connection = self.connection()?;
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        connection.writer.write_all(line.as_bytes())?;
        connection.writer.flush()?;
        let mut response = String::new();
        if connection.reader.read_line(&mut response)? == 0 {
            return Err(Error::PoolHungUp);
        }
        Ok(serde_json::from_str(&response)?)
    }
}

impl WorkerPoolClient for TcpPoolClient {
    fn submit_init_command(&mut self, command: &serde_json::Value) -> Result<(), Error> {
        if self.init_sent {
            return Err(Error::PoolAlreadyInitialized);
        }
        match self.roundtrip(&PoolRequest::Init {
            command: command.clone(),
        })? {
            PoolResponse::Ack => {
                self.init_sent = true;
                Ok(())
            }
            PoolResponse::Refused { message } => Err(Error::PoolRefused { message }),
            PoolResponse::Results { .. } => Err(Error::MisalignedBatch),
        }
    }

    fn submit_batch(&mut self, tasks: &[RemoteTask]) -> Result<Vec<RemoteResult>, Error> {
        match self.roundtrip(&PoolRequest::Batch {
            tasks: tasks.to_vec(),
        })? {
            PoolResponse::Results { results } => Ok(results),
            PoolResponse::Refused { message } => Err(Error::PoolRefused { message }),
            PoolResponse::Ack => Err(Error::MisalignedBatch),
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        if let Some(mut connection) = self.connection.take() {
            let mut line = serde_json::to_string(&PoolRequest::Close)?;
            line.push('\n');
            connection.writer.write_all(line.as_bytes()).ok();
            connection.writer.shutdown(Shutdown::Both).ok();
        }
        Ok(())
    }
}

pub struct DistributedEvaluator {
    client: Mutex<Box<dyn WorkerPoolClient>>,
    failed: AtomicBool,
}

impl DistributedEvaluator {
    pub fn new(client: Box<dyn WorkerPoolClient>) -> Self {
        Self {
            client: Mutex::new(client),
            failed: AtomicBool::new(false),
        }
    }

    pub fn submit_init_command(&self, command: &serde_json::Value) -> Result<(), Error> {
        hold(&self.client).submit_init_command(command)
    }

    pub fn is_active(&self) -> bool {
        !self.failed.load(Ordering::SeqCst)
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    // Results come back 1:1 aligned with the submitted tasks or not at all.
    pub fn evaluate_batch(&self, tasks: &[RemoteTask]) -> Result<Vec<Option<f64>>, Error> {
        let results = hold(&self.client).submit_batch(tasks)?;
        if results.len() != tasks.len() {
            return Err(Error::MisalignedBatch);
        }
        for (task, result) in tasks.iter().zip(&results) {
            if task.task_id != result.task_id {
                return Err(Error::MisalignedBatch);
            }
        }
        Ok(results.into_iter().map(|result| result.value).collect())
    }

    pub fn close(&self) {
        if let Err(error) = hold(&self.client).close() {
            debug!("closing worker pool connection failed: {}", error);
        }
    }
}
