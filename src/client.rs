use crate::error::{Result, StoreError};
use crate::wire::{self, Opcode, STOP_WAITING, VALIDATION_MAGIC};
use rand::Rng;
use std::io::{BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::process;

/// `StoreClient` is one peer's connection to a [`StoreServer`].
///
/// Connecting performs the handshake (VALIDATE with the protocol magic, then
/// PING with this process's id as nonce), after which the data-plane
/// operations can be freely interleaved on the single stream. Server-side
/// request failures surface here as a closed stream; redialing is the
/// caller's job.
///
/// [`StoreServer`]: crate::StoreServer
pub struct StoreClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl StoreClient {
    /// Establishes a connection to the server at `addr` and performs the
    /// handshake.
    ///
    /// An `addr` that is a bare `:port` is dialed as a random address in
    /// `127.0.0.0/8`, spreading high-fan-out local benchmarks across source
    /// addresses so they do not exhaust the ephemeral ports of `127.0.0.1`.
    pub fn connect(addr: &str) -> Result<StoreClient> {
        let addr = expand_bare_port(addr);
        let stream = TcpStream::connect(addr.as_str())?;
        stream.set_nodelay(true)?;

        let mut client = StoreClient {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        };
        client.validate()?;
        client.ping()?;
        Ok(client)
    }

    /// announces the protocol magic; the server reads it silently
    fn validate(&mut self) -> Result<()> {
        wire::write_u8(&mut self.writer, Opcode::Validate as u8)?;
        wire::write_u32(&mut self.writer, VALIDATION_MAGIC)?;
        self.writer.flush()?;
        Ok(())
    }

    /// round-trips a nonce to confirm the server is really serving
    fn ping(&mut self) -> Result<()> {
        let nonce = process::id();
        wire::write_u8(&mut self.writer, Opcode::Ping as u8)?;
        wire::write_u32(&mut self.writer, nonce)?;
        self.writer.flush()?;

        let echoed = wire::read_u32(&mut self.reader)?;
        if echoed != nonce {
            return Err(StoreError::Protocol(format!(
                "ping response {} != {}",
                echoed, nonce
            )));
        }
        Ok(())
    }

    /// Publishes `value` under `key`, waking any peer waiting on it.
    /// No response travels on the wire; a server-side failure is only
    /// observable as a later stream closure.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        wire::write_u8(&mut self.writer, Opcode::Set as u8)?;
        wire::write_bytes(&mut self.writer, key)?;
        wire::write_bytes(&mut self.writer, value)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Fetches the value under `key`, blocking until some peer publishes it.
    ///
    /// The server's read is point-in-time, so the client first waits on the
    /// key; that is what turns a produce-then-consume pair into a rendezvous.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.wait(&[key])?;

        wire::write_u8(&mut self.writer, Opcode::Get as u8)?;
        wire::write_bytes(&mut self.writer, key)?;
        self.writer.flush()?;

        wire::read_bytes(&mut self.reader)
    }

    /// Adds `delta` to the counter under `key` and returns the new value.
    pub fn add(&mut self, key: &[u8], delta: i64) -> Result<i64> {
        wire::write_u8(&mut self.writer, Opcode::Add as u8)?;
        wire::write_bytes(&mut self.writer, key)?;
        wire::write_i64(&mut self.writer, delta)?;
        self.writer.flush()?;

        wire::read_i64(&mut self.reader)
    }

    /// Blocks until every one of `keys` has a published value.
    pub fn wait(&mut self, keys: &[&[u8]]) -> Result<()> {
        wire::write_u8(&mut self.writer, Opcode::Wait as u8)?;
        wire::write_bytes_list(&mut self.writer, keys)?;
        self.writer.flush()?;

        let status = wire::read_u8(&mut self.reader)?;
        if status != STOP_WAITING {
            return Err(StoreError::Protocol(format!(
                "wait response {} != {}",
                status, STOP_WAITING
            )));
        }
        Ok(())
    }

    /// Rendezvous with `world_size - 1` other peers on `key` and return this
    /// peer's rank in `[1, world_size]`.
    ///
    /// Every peer increments the shared counter; the peer that observes
    /// `world_size` publishes `key + "/final"` and everyone else waits on it,
    /// so no peer returns before all have arrived.
    pub fn barrier(&mut self, key: &[u8], world_size: u64) -> Result<u64> {
        let final_key = [key, b"/final"].concat();

        let rank = self.add(key, 1)? as u64;
        if rank == world_size {
            self.set(&final_key, b"done")?;
        } else {
            self.wait(&[final_key.as_slice()])?;
        }
        Ok(rank)
    }
}

/// a bare `:port` becomes a random loopback address; anything else is
/// passed through untouched
fn expand_bare_port(addr: &str) -> String {
    if addr.starts_with(':') {
        let octet: u8 = rand::thread_rng().gen_range(1..=255);
        format!("127.0.0.{}{}", octet, addr)
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port_gets_a_loopback_host() {
        for _ in 0..32 {
            let addr = expand_bare_port(":19503");
            assert!(addr.starts_with("127.0.0."));
            assert!(addr.ends_with(":19503"));
            let octet: u8 = addr
                .trim_start_matches("127.0.0.")
                .trim_end_matches(":19503")
                .parse()
                .unwrap();
            assert!(octet >= 1);
        }
    }

    #[test]
    fn full_addresses_pass_through() {
        assert_eq!(expand_bare_port("10.0.0.7:19503"), "10.0.0.7:19503");
        assert_eq!(expand_bare_port("127.0.0.1:4000"), "127.0.0.1:4000");
    }
}
