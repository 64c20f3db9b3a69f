/*
 * Copyright 2019-2022 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The server half of the remote transport.
//!
//! This is spawned on the remote host by a `RemoteBackend` and speaks the protocol over its
//! standard input and output. Logs go to stderr, which the client captures to explain connection
//! failures. Set `RUST_LOG` to control verbosity.

use std::io::{self, BufReader, BufWriter};
use std::process::exit;

use log::error;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let input = BufReader::new(stdin.lock());
    let output = BufWriter::new(stdout.lock());

    if let Err(error) = sealed_store::store::serve(input, output) {
        error!("{}", error);
        exit(1);
    }
}
