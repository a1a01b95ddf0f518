// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Generation of random codes and strings.

use rand::Rng;
use rand::distr::Alphanumeric;

/// Maximum number of digits a numeric code can have so that it fits in a `u64`.
const MAX_NUMERIC_CODE_LEN: u32 = 18;

/// Generates a random number of exactly `len` decimal digits.
///
/// The returned value is in the `[10^(len-1), 10^len)` range, so it never has leading zeros.
pub fn numeric_code(len: u32) -> Result<u64, String> {
    if len == 0 || len > MAX_NUMERIC_CODE_LEN {
        return Err(format!(
            "Numeric code length must be between 1 and {} but got {}",
            MAX_NUMERIC_CODE_LEN, len
        ));
    }

    let start = 10u64.pow(len - 1);
    let end = 10u64.pow(len);
    Ok(rand::rng().random_range(start..end))
}

/// Generates a random string of `len` characters taken from `[A-Za-z0-9]`.
pub fn alphanumeric(len: usize) -> String {
    rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}
