use crate::error::Error;
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkIndividual {
    pub chromosome: serde_json::Value,
    pub value: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkRequest {
    Send {
        from_id: usize,
        to_id: usize,
        individuals: Vec<LinkIndividual>,
    },
    Recv {
        id: usize,
    },
    Close,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkResponse {
    Ack,
    Individuals { individuals: Vec<LinkIndividual> },
    TimedOut,
    Refused { message: String },
}

pub trait MigrationLink: Send {
    fn send(
        &mut self,
        from_id: usize,
        to_id: usize,
        individuals: Vec<LinkIndividual>,
    ) -> Result<(), Error>;
    fn recv(&mut self, my_id: usize) -> Result<Vec<LinkIndividual>, Error>;
    fn close(&mut self) -> Result<(), Error>;
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

pub struct TcpMigrationLink {
    host: String,
    port: u16,
    connection: Option<Connection>,
}

impl TcpMigrationLink {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connection: None,
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
            debug!("connected to migration relay at {}:{}", self.host, self.port);
        }
        Ok(self.connection.as_mut().expect("connection just created"))
    }

    fn roundtrip(&mut self, request: &LinkRequest) -> Result<LinkResponse, Error> {
        let connection = self.connection()?;
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        connection.writer.write_all(line.as_bytes())?;
        connection.writer.flush()?;
        let mut response = String::new();
        if connection.reader.read_line(&mut response)? == 0 {
            return Err(Error::LinkHungUp);
        }
        Ok(serde_json::from_str(&response)?)
    }
}

impl MigrationLink for TcpMigrationLink {
    fn send(
        &mut self,
        from_id: usize,
        to_id: usize,
        individuals: Vec<LinkIndividual>,
    ) -> Result<(), Error> {
        match self.roundtrip(&LinkRequest::Send {
            from_id,
            to_id,
            individuals,
        })? {
            LinkResponse::Ack => Ok(()),
            LinkResponse::Refused { message } => Err(Error::LinkRefused { message }),
            LinkResponse::Individuals { .. } | LinkResponse::TimedOut => Err(Error::LinkHungUp),
        }
    }

    // A relay timeout is an empty batch, not a failure.
    fn recv(&mut self, my_id: usize) -> Result<Vec<LinkIndividual>, Error> {
        match self.roundtrip(&LinkRequest::Recv { id: my_id })? {
            LinkResponse::Individuals { individuals } => Ok(individuals),
            LinkResponse::TimedOut => Ok(Vec::new()),
            LinkResponse::Refused { message } => Err(Error::LinkRefused { message }),
            LinkResponse::Ack => Err(Error::LinkHungUp),
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        if let Some(mut connection) = self.connection.take() {
            let mut line = serde_json::to_string(&LinkRequest::Close)?;
            line.push('\n');
            connection.writer.write_all(line.as_bytes()).ok();
            connection.writer.shutdown(Shutdown::Both).ok();
        }
        Ok(())
    }
}
