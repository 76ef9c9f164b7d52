//! Replicated in-memory users API served by several worker processes.
//!
//! A supervisor process spawns N workers, relays replication traffic between
//! them and balances HTTP requests across them. Each worker owns a full copy of
//! the user list; after every local mutation it sends its whole snapshot to the
//! supervisor, which broadcasts it to every worker, and each worker overwrites
//! its copy. There is no merge and no version: when two workers mutate before
//! seeing each other's broadcast, the last broadcast applied wins.
//!
//! - [`cli`] parses the `worker` and `supervisor` subcommands.
//! - [`user`] defines the record plus create/patch validation.
//! - [`store`] holds one worker's snapshot and publishes it on mutation.
//! - [`router`] maps method, path and body to a status and JSON body.
//! - [`runtime`] runs the store inside a single actor task.
//! - [`http`] is the axum endpoint in front of the actor.
//! - [`message`] is the JSON line protocol shared by workers and relay.
//! - [`replication`] is the worker's connection to the relay.
//! - [`relay`] rebroadcasts snapshots to every connected worker.
//! - [`balancer`] forwards public traffic to workers round-robin.
//! - [`worker`] and [`supervisor`] assemble the two process kinds.

pub mod balancer;
pub mod cli;
pub mod error;
pub mod http;
pub mod message;
pub mod relay;
pub mod replication;
pub mod router;
pub mod runtime;
pub mod store;
pub mod supervisor;
pub mod user;
pub mod worker;
