// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod syn_cache;
mod tcp;

//==============================================================================
// Exports
//==============================================================================

pub use self::{
    syn_cache::SynCacheConfig,
    tcp::TcpConfig,
};
