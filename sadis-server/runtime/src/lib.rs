#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use bbsim_sadis_server_core as core;
pub use bbsim_sadis_server_fetch as fetch;
pub use bbsim_sadis_server_http as http;
pub use bbsim_sadis_server_k8s_watcher as watcher;

mod args;

pub use self::args::Args;
