use earcutr::earcut;

/// Triangulate a polygon exterior ring.
///
/// The ring is an open sequence of 2D points (closing point omitted).
/// Returns triangle indices into the ring, three per triangle; fewer than 3
/// points yield no triangles.
pub fn triangulate_ring(ring: &[(f64, f64)]) -> Vec<u32> {
    if ring.len() < 3 {
        return Vec::new();
    }

    let mut vertices: Vec<f64> = Vec::with_capacity(ring.len() * 2);
    for &(x, y) in ring {
        vertices.push(x);
        vertices.push(y);
    }

    earcut(&vertices, &[], 2)
        .unwrap_or_default()
        .into_iter()
        .map(|i| i as u32)
        .collect()
}

/// Relative deviation between the polygon area and the summed area of its
/// triangles. Zero means the triangulation covers the polygon exactly.
///
/// `vertices` is a flat interleaved array, `dim` components per vertex.
pub fn deviation(vertices: &[f64], dim: usize, triangles: &[u32]) -> f64 {
    let polygon_area = signed_area(vertices, dim).abs();

    let mut triangles_area = 0.0;
    for tri in triangles.chunks_exact(3) {
        let a = tri[0] as usize * dim;
        let b = tri[1] as usize * dim;
        let c = tri[2] as usize * dim;
        triangles_area += ((vertices[a] - vertices[c]) * (vertices[b + 1] - vertices[a + 1])
            - (vertices[a] - vertices[b]) * (vertices[c + 1] - vertices[a + 1]))
            .abs();
    }
    triangles_area /= 2.0;

    if polygon_area == 0.0 && triangles_area == 0.0 {
        return 0.0;
    }

    ((triangles_area - polygon_area) / polygon_area).abs()
}

fn signed_area(vertices: &[f64], dim: usize) -> f64 {
    // a trailing partial vertex is ignored rather than read out of bounds
    let end = if dim < 2 {
        0
    } else {
        vertices.len() - vertices.len() % dim
    };
    if end < dim {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut j = end - dim;

    let mut i = 0;
    while i < end {
        sum += (vertices[j] - vertices[i]) * (vertices[i + 1] + vertices[j + 1]);
        j = i;
        i += dim;
    }

    sum / 2.0
}
