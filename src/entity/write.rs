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

use super::{Entity, Multipart, MultipartEncrypted, MultipartSigned};
use crate::parse::CRLF;

pub(super) fn write_entity(entity: &Entity, out: &mut Vec<u8>) {
    match entity {
        Entity::Part(part) => {
            part.headers.write_to(out);
            out.extend(CRLF);
            out.extend(&part.body);
        }
        Entity::Multipart(m)
        | Entity::Signed(MultipartSigned(m))
        | Entity::Encrypted(MultipartEncrypted(m)) => {
            write_multipart(m, out);
        }
        Entity::Message(message) => {
            message.headers.write_to(out);
            out.extend(CRLF);
            if let Some(embedded) = &message.message {
                write_entity(embedded, out);
            }
        }
    }
}

fn write_multipart(multipart: &Multipart, out: &mut Vec<u8>) {
    multipart.headers.write_to(out);
    out.extend(CRLF);

    if let Some(preamble) = &multipart.preamble {
        out.extend(preamble);
        out.extend(CRLF);
    }

    let boundary = multipart.boundary.as_bytes();

    for part in &multipart.parts {
        out.extend(b"--");
        out.extend(boundary);
        out.extend(CRLF);
        write_entity(part, out);
        out.extend(CRLF);
    }

    out.extend(b"--");
    out.extend(boundary);
    out.extend(b"--");

    match &multipart.epilogue {
        Some(epilogue) => out.extend(epilogue),
        None => out.extend(CRLF),
    }
}
