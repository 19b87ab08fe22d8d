//! List the geometries the service allows for a GPU model

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{format_geometry, print_json, print_table, OutputFormat};

#[derive(Tabled, serde::Serialize)]
struct GeometryRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Geometry")]
    geometry: String,
    #[tabled(rename = "Slices")]
    slices: u32,
}

pub async fn list_geometries(client: &ApiClient, model: &str, format: OutputFormat) -> Result<()> {
    let response = client.geometries(model).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            println!("Allowed geometries for {}:", response.model);
            let rows: Vec<GeometryRow> = response
                .geometries
                .iter()
                .enumerate()
                .map(|(index, geometry)| GeometryRow {
                    index,
                    geometry: format_geometry(geometry),
                    slices: geometry.iter().map(|(_, count)| count).sum(),
                })
                .collect();
            print_table(&rows, format);
        }
    }

    Ok(())
}
