mod bootstrap;
mod options;
mod reconcile;
mod replication;
