/*!
Active endpoint health checking for cluster workloads.

The cluster's built-in node failure detection runs with a grace period of
tens of seconds, which leaves dead backends in service rotation far longer
than most applications tolerate. This crate closes that gap: while holding a
cluster-wide lease, it watches opted-in workloads, probes their network
endpoints (TCP connect or ICMP echo) on a short interval from a bounded
worker pool, and writes the reachability verdict back into the workload's
status conditions so the routing layer drops unreachable endpoints within
one probe interval.
*/

pub mod cli;
pub mod config;
pub mod core;
