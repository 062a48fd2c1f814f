//! Fixed-layout textual report of a completed run.
//!
//! The section layout and number rendering are a compatibility surface:
//! values use normalized scientific notation with four fractional digits and
//! an explicitly signed exponent, matrix rows are tab-separated.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::RunConfiguration;
use crate::tally::Grid;

use super::SimulationResult;

/// Version tag of the report format.
const FORMAT_VERSION: &str = "A1";

/// Renders the full report as text.
pub fn format_report(config: &RunConfiguration, result: &SimulationResult) -> String {
    let mut out = String::new();

    write_header(&mut out);
    line(&mut out, &format!("# Simulation time: {:.3} seconds", result.simulation_time));
    write_input_parameters(&mut out, config);
    write_rat(&mut out, result);

    write_profile(&mut out, "A_l #Absorption as a function of layer. [-]", &result.a_l);
    write_profile(&mut out, "A_z #A[0], [1],..A[nz-1]. [1/cm]", &result.a_z);
    write_profile(&mut out, "Rd_r #Rd[0], [1],..Rd[nr-1]. [1/cm2]", &result.rd_r);
    write_profile(&mut out, "Rd_a #Rd[0], [1],..Rd[na-1]. [sr-1]", &result.rd_a);
    write_profile(&mut out, "Tt_r #Tt[0], [1],..Tt[nr-1]. [1/cm2]", &result.tt_r);
    write_profile(&mut out, "Tt_a #Tt[0], [1],..Tt[na-1]. [sr-1]", &result.tt_a);

    write_matrix(
        &mut out,
        &["#A[r][z]. [1/cm3]",
          "# A[0][0], [0][1],..[0][nz-1]",
          "# A[1][0], [1][1],..[1][nz-1]",
          "# ...",
          "# A[nr-1][0], [nr-1][1],..[nr-1][nz-1]",
          "A_rz"],
        &result.a_rz,
    );
    write_matrix(
        &mut out,
        &["#Rd[r][angle]. [1/(cm2sr)].",
          "# Rd[0][0], [0][1],..[0][na-1]",
          "# Rd[1][0], [1][1],..[1][na-1]",
          "# ...",
          "# Rd[nr-1][0], [nr-1][1],..[nr-1][na-1]",
          "Rd_ra"],
        &result.rd_ra,
    );
    write_matrix(
        &mut out,
        &["#Tt[r][angle]. [1/(cm2sr)].",
          "# Tt[0][0], [0][1],..[0][na-1]",
          "# Tt[1][0], [1][1],..[1][na-1]",
          "# ...",
          "# Tt[nr-1][0], [nr-1][1],..[nr-1][na-1]",
          "Tt_ra"],
        &result.tt_ra,
    );

    out
}

/// Writes the report to a file.
pub fn write_report(path: &Path, config: &RunConfiguration, result: &SimulationResult) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(format_report(config, result).as_bytes())?;
    Ok(())
}

fn line(out: &mut String, text: &str) {
    out.push_str(text);
    out.push('\n');
}

fn write_header(out: &mut String) {
    line(out, &format!("{FORMAT_VERSION} \t# Version number of the file format."));
    line(out, "");
    line(out, "####");
    line(out, "# Data categories include:");
    line(out, "# InParm, RAT,");
    line(out, "# A_l, A_z, Rd_r, Rd_a, Tt_r, Tt_a,");
    line(out, "# A_rz, Rd_ra, Tt_ra");
    line(out, "####");
    line(out, "");
}

fn write_input_parameters(out: &mut String, config: &RunConfiguration) {
    let file_name = config
        .output_file
        .split_whitespace()
        .next()
        .unwrap_or("output.mco");

    line(out, "InParm\t\t\t\t\t# Input parameters. cm is used.");
    line(out, &format!("{file_name}\t\t\t\t# output file name, ASCII."));
    line(out, &format!("{}\t\t\t\t\t# No. of photons", config.photons));
    line(out, &format!("{}\t{}\t\t\t\t# dz, dr [cm]", config.dz, config.dr));
    line(
        out,
        &format!(
            "{}\t{}\t{}\t{}\t\t# No. of dz, dr, da, & t.",
            config.nz, config.nr, config.na, config.nt
        ),
    );
    line(out, "");

    line(
        out,
        &format!("{}\t\t\t\t\t# Number of layers", config.num_physical_layers()),
    );
    line(out, "#n\tmua\tmus\tg\td\t# One line for each layer");
    line(out, &format!("{}\t\t\t\t\t# n for medium above", config.layers[0].n));
    for (i, layer) in config.layers[1..config.layers.len() - 1].iter().enumerate() {
        line(
            out,
            &format!(
                "{}\t{}\t{}\t{}\t{}\t# layer {}",
                layer.n,
                layer.mua,
                layer.mus,
                layer.g,
                layer.d,
                i + 1
            ),
        );
    }
    line(
        out,
        &format!(
            "{} \t\t\t\t\t# n for medium below",
            config.layers[config.layers.len() - 1].n
        ),
    );
    line(out, "");
}

fn write_rat(out: &mut String, result: &SimulationResult) {
    line(out, "RAT #Reflectance, absorption, transmission.");
    line(out, &format!("{:.6} \t# Specular reflectance [-]", result.rsp));
    line(out, &format!("{:.6} \t# Diffuse reflectance [-]", result.rd));
    line(
        out,
        &format!("# {:.6} \t# Total reflectance [-]", result.rd + result.rsp),
    );
    line(out, &format!("{:.6} \t# Absorbed fraction [-]", result.a));
    line(
        out,
        &format!("# {:.6} \t# Specular Transmittance [-]", result.tt_unscattered),
    );
    line(out, &format!("# {:.6} \t# Diffuse Transmittance [-]", result.tt));
    line(
        out,
        &format!(
            "{:.6} \t# Total Transmittance [-]",
            result.tt + result.tt_unscattered
        ),
    );
    line(out, "");
}

fn write_profile(out: &mut String, header: &str, values: &[f64]) {
    line(out, header);
    for &value in values {
        line(out, &format!("\t{}", sci(value)));
    }
    line(out, "");
}

fn write_matrix(out: &mut String, headers: &[&str], grid: &Grid) {
    for header in headers {
        line(out, header);
    }
    for i in 0..grid.rows() {
        let row: Vec<String> = grid.row(i).iter().map(|&v| sci(v)).collect();
        line(out, &row.join("\t"));
    }
    line(out, "");
}

/// Normalized scientific notation with four fractional digits and an
/// explicitly signed exponent, e.g. `1.2345E-2` or `0.0000E+0`.
fn sci(value: f64) -> String {
    if value == 0.0 {
        return "0.0000E+0".to_string();
    }

    let mut exponent = value.abs().log10().floor() as i32;
    let mut mantissa = value / 10f64.powi(exponent);

    // Rounding to four digits can push the mantissa out of [1, 10).
    let rounded = (mantissa.abs() * 1e4).round() / 1e4;
    if rounded >= 10.0 {
        mantissa /= 10.0;
        exponent += 1;
    } else if rounded < 1.0 {
        mantissa *= 10.0;
        exponent -= 1;
    }

    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{:.4}E{}{}", mantissa, sign, exponent.abs())
}
