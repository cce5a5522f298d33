// viamime – implementation of the MIME security multiparts
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Entity preparation.

use crate::{
    encoding::TransferEncoding,
    entity::{Entity, MultipartEncrypted},
};
use tracing::trace;

/// Prepares an entity tree for signing or encryption.
///
/// Every leaf part that is not already Base64 encoded is given a transfer
/// encoding that survives transport unmodified: binary content becomes
/// Base64, all other content Quoted-Printable. This includes parts that are
/// already 7bit. Nested `multipart/signed` entities are left untouched, as
/// changing them would break their signature.
///
/// Preparation is idempotent.
pub fn prepare_entity(entity: &mut Entity) {
    match entity {
        Entity::Part(part) => {
            let current = part.transfer_encoding();
            let encoding = match current {
                TransferEncoding::Base64 | TransferEncoding::QuotedPrintable => return,
                TransferEncoding::Binary => TransferEncoding::Base64,
                TransferEncoding::SevenBit | TransferEncoding::EightBit => TransferEncoding::QuotedPrintable,
            };

            trace!("re-encoding {current} part body as {encoding}");

            // identity encodings: the raw body is the content
            part.encode_raw_body(encoding);
        }
        Entity::Multipart(multipart) | Entity::Encrypted(MultipartEncrypted(multipart)) => {
            for part in multipart.parts_mut() {
                prepare_entity(part);
            }
        }
        Entity::Signed(_) => {}
        Entity::Message(message) => {
            if let Some(embedded) = message.message_mut() {
                prepare_entity(embedded);
            }
        }
    }
}
