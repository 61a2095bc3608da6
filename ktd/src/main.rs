// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

use kt_node::node::run;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ktd failed: {:?}", e);
    }
}
