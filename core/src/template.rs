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

//! Trivial templating engine.

/// Performs named string replacements in `input` based on `replacements`.
///
/// The `input` string can have `%key%` markers in it which are replaced by the value of `key` in
/// `replacements`.  Markers for unknown keys are left untouched, as is an unterminated `%`.  A
/// raw `%` can be written as `%%`.  Replaced values are not expanded again.
pub fn apply(input: &str, replacements: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &after[..end];
        if key.is_empty() {
            output.push('%');
        } else {
            match replacements.iter().find(|(candidate, _)| *candidate == key) {
                Some((_, value)) => output.push_str(value),
                None => {
                    output.push('%');
                    output.push_str(key);
                    output.push('%');
                }
            }
        }
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    output
}
