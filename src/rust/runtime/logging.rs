// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::flexi_logger::Logger;
use ::std::sync::Once;

//==============================================================================
// Static Variables
//==============================================================================

/// Guardian to the logging initialize function.
static INIT_LOG: Once = Once::new();

//==============================================================================
// Standalone Functions
//==============================================================================

/// Initializes logging features.
///
/// The log specification is taken from `RUST_LOG`. Logging stays disabled when the variable is not set.
pub fn initialize() {
    INIT_LOG.call_once(|| {
        let logger: Result<_, _> = Logger::try_with_env_or_str("").and_then(|logger| logger.start());
        if let Err(e) = logger {
            eprintln!("initialize(): failed to start logger ({:?})", e);
        }
    });
}
