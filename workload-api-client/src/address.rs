// Copyright (c) Microsoft. All rights reserved.

//! Workload API endpoint address parsing: `unix:/path/to/socket` or
//! `tcp://<literal-ip>:<port>`, normally supplied through the
//! `SPIFFE_ENDPOINT_SOCKET` environment variable.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

/// Environment variable naming the Workload API endpoint.
pub const ENDPOINT_SOCKET_ENV: &str = "SPIFFE_ENDPOINT_SOCKET";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointAddress {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("endpoint address cannot be empty")]
    Empty,
    #[error("endpoint address scheme must be 'unix' or 'tcp'")]
    UnsupportedScheme,
    #[error("endpoint address cannot contain a query or fragment")]
    QueryOrFragmentNotAllowed,
    #[error("endpoint address cannot contain userinfo")]
    UserinfoNotAllowed,
    #[error("unix endpoint address must have a path")]
    MissingPath,
    #[error("unix endpoint address path must be absolute")]
    RelativePath,
    #[error("unix endpoint address cannot contain a host")]
    HostNotAllowed,
    #[error("tcp endpoint address host must be a literal IP address")]
    HostNotIp,
    #[error("tcp endpoint address must have a port")]
    MissingPort,
    #[error("tcp endpoint address port is invalid")]
    InvalidPort,
    #[error("tcp endpoint address cannot contain a path")]
    PathNotAllowed,
}

/// Parses an endpoint address URI. `unix:` addresses accept both the
/// opaque (`unix:/path`) and the empty-authority (`unix:///path`)
/// spellings; `tcp://` addresses require a literal IP and a port.
pub fn parse_endpoint_address(input: &str) -> Result<EndpointAddress, AddressError> {
    let input = input.trim();

    if input.is_empty() {
        return Err(AddressError::Empty);
    }
    if input.contains('?') || input.contains('#') {
        return Err(AddressError::QueryOrFragmentNotAllowed);
    }

    if let Some(rest) = strip_scheme(input, "unix:") {
        return parse_unix(rest);
    }
    if let Some(rest) = strip_scheme(input, "tcp://") {
        return parse_tcp(rest);
    }

    Err(AddressError::UnsupportedScheme)
}

fn parse_unix(rest: &str) -> Result<EndpointAddress, AddressError> {
    let path = if let Some(authority_form) = rest.strip_prefix("//") {
        // unix://<authority><path>: only an empty authority is allowed.
        if !authority_form.starts_with('/') {
            return Err(AddressError::HostNotAllowed);
        }
        authority_form
    } else {
        rest
    };

    if path.is_empty() {
        return Err(AddressError::MissingPath);
    }
    if !path.starts_with('/') {
        return Err(AddressError::RelativePath);
    }

    Ok(EndpointAddress::Unix(PathBuf::from(path)))
}

fn parse_tcp(rest: &str) -> Result<EndpointAddress, AddressError> {
    if rest.contains('@') {
        return Err(AddressError::UserinfoNotAllowed);
    }

    let (host_port, path) = match rest.find('/') {
        Some(at) => rest.split_at(at),
        None => (rest, ""),
    };
    if !path.is_empty() {
        return Err(AddressError::PathNotAllowed);
    }

    let (host, port) = if let Some(v6) = host_port.strip_prefix('[') {
        let end = v6.find(']').ok_or(AddressError::HostNotIp)?;
        let port = v6[end + 1..]
            .strip_prefix(':')
            .ok_or(AddressError::MissingPort)?;
        (&v6[..end], port)
    } else {
        match host_port.rfind(':') {
            Some(at) => (&host_port[..at], &host_port[at + 1..]),
            None => return Err(AddressError::MissingPort),
        }
    };

    if port.is_empty() {
        return Err(AddressError::MissingPort);
    }
    let port: u16 = port.parse().map_err(|_| AddressError::InvalidPort)?;
    let ip: IpAddr = host.parse().map_err(|_| AddressError::HostNotIp)?;

    Ok(EndpointAddress::Tcp(SocketAddr::new(ip, port)))
}

fn strip_scheme<'a>(input: &'a str, scheme: &str) -> Option<&'a str> {
    input
        .get(..scheme.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
        .map(|prefix| &input[prefix.len()..])
}
