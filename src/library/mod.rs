// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod record;
mod storage;
mod store;

pub use record::PodcastRecord;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, decode_records, encode_records};
pub use store::{LIBRARY_KEY, LibraryState, LibraryStore};
