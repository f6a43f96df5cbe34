use crate::infrastructure::control::{
    control_socket_name, ControlCommand, ControlMessage, ControlResponse,
};
use anyhow::{bail, Context, Result};
use interprocess::local_socket::{traits::Stream, Stream as LocalStream};
use std::io::{BufRead, BufReader, Write};

pub struct ControlClient {
    stream: LocalStream,
    token: Option<String>,
}

impl ControlClient {
    pub fn connect(token: Option<String>) -> Result<Self> {
        let stream = LocalStream::connect(control_socket_name()?)
            .context("Bridge is not running (control socket unavailable)")?;
        Ok(Self { stream, token })
    }

    pub fn send_command(&mut self, command: ControlCommand) -> Result<ControlResponse> {
        let message = ControlMessage {
            token: self.token.clone(),
            command,
        };
        let json_cmd = serde_json::to_string(&message)? + "\n";
        self.stream.write_all(json_cmd.as_bytes())?;
        self.stream.flush()?;

        let mut reader = BufReader::new(&mut self.stream);
        let mut buffer = String::new();
        if reader.read_line(&mut buffer)? == 0 {
            bail!("Bridge closed the control connection");
        }

        Ok(serde_json::from_str(&buffer)?)
    }
}

/// Entry point for `ctl`: sends one command and prints the reply.
pub fn run(command: ControlCommand, token: Option<String>) -> Result<()> {
    let mut client = ControlClient::connect(token)?;
    match client.send_command(command)? {
        ControlResponse::Pong => println!("pong"),
        ControlResponse::Success(msg) => println!("{msg}"),
        ControlResponse::Status(status) => println!("{}", serde_json::to_string_pretty(&status)?),
        ControlResponse::Stats(stats) => println!(
            "prev={} next={} unknown={} total={}",
            stats.prev_count,
            stats.next_count,
            stats.unknown_count(),
            stats.total_count
        ),
        ControlResponse::Logs(lines) => {
            for line in lines {
                println!("{line}");
            }
        }
        ControlResponse::Error(e) => bail!("{e}"),
    }
    Ok(())
}
