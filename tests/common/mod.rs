//! In-memory PDF fixtures shared by the integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;

/// Assemble a classic-xref PDF from numbered object bodies
pub fn build_pdf(objects: &[(u32, &[u8])], trailer: &str) -> Vec<u8> {
    let mut data = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let offsets = append_objects(&mut data, objects);
    let size = offsets.keys().next_back().map_or(1, |n| n + 1);

    let xref_at = data.len();
    data.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
    for number in 1..size {
        match offsets.get(&number) {
            Some(offset) => data.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes()),
            None => data.extend_from_slice(b"0000000000 00000 f \n"),
        }
    }
    data.extend_from_slice(format!("trailer\n{}\nstartxref\n{}\n%%EOF\n", trailer, xref_at).as_bytes());
    data
}

/// Append an incremental update redefining `objects`
pub fn append_update(mut data: Vec<u8>, objects: &[(u32, &[u8])], trailer: &str) -> Vec<u8> {
    let prev = startxref(&data).unwrap_or(0);
    let offsets = append_objects(&mut data, objects);

    let xref_at = data.len();
    data.extend_from_slice(b"xref\n");
    for (number, offset) in &offsets {
        data.extend_from_slice(format!("{} 1\n{:010} 00000 n \n", number, offset).as_bytes());
    }
    let trailer = trailer.replace("PREV", &prev.to_string());
    data.extend_from_slice(format!("trailer\n{}\nstartxref\n{}\n%%EOF\n", trailer, xref_at).as_bytes());
    data
}

/// Value of the last `startxref`
pub fn startxref(data: &[u8]) -> Option<usize> {
    let at = data.windows(9).rposition(|w| w == b"startxref")?;
    let digits: String = data[at + 9..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| char::from(b))
        .collect();
    digits.parse().ok()
}

/// Catalog, one-level page tree and a content stream per page
pub fn simple_document(pages: usize) -> Vec<u8> {
    let mut bodies: Vec<(u32, Vec<u8>)> = Vec::new();
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
    bodies.push((1, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec()));
    bodies.push((2, format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages).into_bytes()));
    for i in 0..pages {
        let page = 3 + 2 * i as u32;
        let content = format!("BT /F1 12 Tf (page {}) Tj ET", i + 1);
        bodies.push((page, format!("<< /Type /Page /Parent 2 0 R /Contents {} 0 R >>", page + 1).into_bytes()));
        bodies.push((
            page + 1,
            format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content).into_bytes(),
        ));
    }
    let size = 3 + 2 * pages;
    let objects: Vec<(u32, &[u8])> = bodies.iter().map(|(n, body)| (*n, body.as_slice())).collect();
    build_pdf(&objects, &format!("<< /Size {} /Root 1 0 R >>", size))
}

fn append_objects(data: &mut Vec<u8>, objects: &[(u32, &[u8])]) -> BTreeMap<u32, usize> {
    let mut offsets = BTreeMap::new();
    for (number, body) in objects {
        offsets.insert(*number, data.len());
        data.extend_from_slice(format!("{} 0 obj\n", number).as_bytes());
        data.extend_from_slice(body);
        data.extend_from_slice(b"\nendobj\n");
    }
    offsets
}
