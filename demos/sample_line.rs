use meshloc::{Locator, LocatorOptions, Mesh, MeshHandle, PointLocator};

fn main() -> anyhow::Result<()> {
    let (xmin, xmax) = (0., 10.);
    let (ymin, ymax) = (0., 5.);
    let n = 20;

    let mesh = MeshHandle::new(Mesh::triangle_grid(xmin, xmax, ymin, ymax, 2 * n, n)?);
    let locator = Locator::new(&mesh, LocatorOptions::default())?;

    // Sample points along a line crossing the mesh, and leaving it at the end
    let samples: Vec<_> = (0..=24)
        .map(|k| {
            let t = k as f64 / 20.;
            [xmin + t * (xmax - xmin), ymin + t * (ymax - ymin) / 2.]
        })
        .collect();

    for (point, result) in samples.iter().zip(locator.locate_many(&samples)?) {
        match result.hit() {
            Some(hit) => println!(
                "{point:>6.2?} -> element {:>4} at {:.3?}",
                hit.element, hit.local
            ),
            None => println!("{point:>6.2?} -> outside of the mesh"),
        }
    }

    // Refine the mesh: the next query rebuilds the index
    mesh.replace(Mesh::triangle_grid(xmin, xmax, ymin, ymax, 4 * n, 2 * n)?);
    let result = locator.locate(&samples[10])?;
    println!(
        "After refinement: {:?} -> {:?} ({} builds)",
        samples[10],
        result.element(),
        locator.build_count()
    );

    Ok(())
}
