/*! Integration tests for sortview.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - keyed_store: KeyedStore behaviour through the public API
 * - ordered_index: OrderedIndex bulk and single operations
 * - projection: LiveProjection dirty repair and filter partition
 * - writer: SingleWriter ordering, reentrancy and shutdown
 * - view: ViewState and LiveView end to end, including event mirrors
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("sortview=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod helpers;
mod keyed_store;
mod ordered_index;
mod projection;
mod view;
mod writer;
