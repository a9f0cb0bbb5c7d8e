//! PCD (Point Cloud Data) format support
//!
//! Reads ASCII and binary PCD files and writes ASCII (default) or binary
//! ones. Only the `x y z` fields, and `normal_x normal_y normal_z` when
//! present, are extracted; every other field is skipped.

use crate::error::{open, IoError};
use crate::{PointCloudReader, PointCloudWriter};
use pointkit_core::{Error, Normal3f, NormalPoint3f, Point3f, PointCloud, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{info, warn};

/// Viewpoint written when none is given: identity pose
const DEFAULT_VIEWPOINT: [f64; 7] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];

/// Upper bound on points reserved up front; larger clouds grow as they are read
const PREALLOC_POINTS: usize = 1 << 20;

/// Largest binary record accepted
const MAX_RECORD_BYTES: usize = 1 << 16;

/// PCD data format variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcdDataFormat {
    Ascii,
    Binary,
}

/// PCD field data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcdFieldType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl PcdFieldType {
    fn from_type_and_size(type_str: &str, size: usize) -> Option<Self> {
        match (type_str, size) {
            ("I", 1) => Some(PcdFieldType::I8),
            ("I", 2) => Some(PcdFieldType::I16),
            ("I", 4) => Some(PcdFieldType::I32),
            ("U", 1) => Some(PcdFieldType::U8),
            ("U", 2) => Some(PcdFieldType::U16),
            ("U", 4) => Some(PcdFieldType::U32),
            ("F", 4) => Some(PcdFieldType::F32),
            ("F", 8) => Some(PcdFieldType::F64),
            _ => None,
        }
    }

    /// Size of one value in bytes
    pub fn size(self) -> usize {
        match self {
            PcdFieldType::I8 | PcdFieldType::U8 => 1,
            PcdFieldType::I16 | PcdFieldType::U16 => 2,
            PcdFieldType::I32 | PcdFieldType::U32 | PcdFieldType::F32 => 4,
            PcdFieldType::F64 => 8,
        }
    }

    fn type_char(self) -> &'static str {
        match self {
            PcdFieldType::I8 | PcdFieldType::I16 | PcdFieldType::I32 => "I",
            PcdFieldType::U8 | PcdFieldType::U16 | PcdFieldType::U32 => "U",
            PcdFieldType::F32 | PcdFieldType::F64 => "F",
        }
    }

    fn decode_le(self, bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        match self {
            PcdFieldType::I8 => bytes[0] as i8 as f64,
            PcdFieldType::U8 => bytes[0] as f64,
            PcdFieldType::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            PcdFieldType::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            PcdFieldType::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PcdFieldType::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PcdFieldType::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PcdFieldType::F64 => f64::from_le_bytes(buf),
        }
    }
}

/// PCD field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcdField {
    pub name: String,
    pub field_type: PcdFieldType,
    pub count: usize,
}

impl PcdField {
    fn f32(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: PcdFieldType::F32,
            count: 1,
        }
    }
}

/// PCD header information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcdHeader {
    pub version: String,
    pub fields: Vec<PcdField>,
    pub width: usize,
    pub height: usize,
    pub viewpoint: [f64; 7], // tx, ty, tz, qw, qx, qy, qz
    pub data_format: PcdDataFormat,
}

impl PcdHeader {
    /// Number of points described by the header
    pub fn points(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    /// Whether the cloud is organized (an image-like grid)
    pub fn is_organized(&self) -> bool {
        self.height > 1
    }

    /// Position of the first value of `name`, counted in values (ASCII) and
    /// in bytes (binary)
    fn locate(&self, name: &str) -> Option<FieldSlot> {
        let mut value = 0;
        let mut byte = 0;
        for field in &self.fields {
            if field.name == name {
                return Some(FieldSlot { value, byte, field_type: field.field_type });
            }
            value += field.count;
            byte += field.count * field.field_type.size();
        }
        None
    }

    fn values_per_point(&self) -> usize {
        self.fields.iter().map(|f| f.count).sum()
    }

    fn bytes_per_point(&self) -> usize {
        self.fields.iter().map(|f| f.count * f.field_type.size()).sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldSlot {
    value: usize,
    byte: usize,
    field_type: PcdFieldType,
}

/// Where to find the coordinates (and normals, if any) in one record
struct Layout {
    xyz: [FieldSlot; 3],
    normal: Option<[FieldSlot; 3]>,
}

impl Layout {
    fn new(header: &PcdHeader) -> std::result::Result<Self, IoError> {
        let find = |name: &str| header.locate(name);
        let xyz = match (find("x"), find("y"), find("z")) {
            (Some(x), Some(y), Some(z)) => [x, y, z],
            _ => return Err(IoError::format("PCD FIELDS must include x, y and z")),
        };
        let normal = match (find("normal_x"), find("normal_y"), find("normal_z")) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        };
        Ok(Self { xyz, normal })
    }
}

/// Points and optional normals read from a PCD file
#[derive(Debug, Clone)]
pub struct PcdData {
    pub header: PcdHeader,
    pub cloud: PointCloud<Point3f>,
    pub normals: Option<Vec<Normal3f>>,
}

/// PCD write options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcdWriteOptions {
    pub data_format: PcdDataFormat,
    pub version: String,
    pub viewpoint: Option<[f64; 7]>,
}

impl Default for PcdWriteOptions {
    fn default() -> Self {
        Self {
            data_format: PcdDataFormat::Ascii,
            version: "0.7".to_string(),
            viewpoint: None,
        }
    }
}

/// PCD reader
pub struct PcdReader;

impl PcdReader {
    /// Read a PCD file, keeping normals when the file has them
    pub fn read_pcd_file<P: AsRef<Path>>(path: P) -> Result<PcdData> {
        let path = path.as_ref();
        let mut reader = BufReader::new(open(path)?);
        let data = Self::read_pcd_data(&mut reader)?;
        info!(
            path = %path.display(),
            points = data.cloud.len(),
            normals = data.normals.is_some(),
            "loaded PCD"
        );
        Ok(data)
    }

    /// Read PCD data from a reader
    pub fn read_pcd_data<R: BufRead>(reader: &mut R) -> Result<PcdData> {
        let mut line_no = 0;
        let header = Self::read_header(reader, &mut line_no)?;
        let layout = Layout::new(&header)?;
        let (points, normals) = match header.data_format {
            PcdDataFormat::Ascii => Self::read_ascii_points(reader, &header, &layout, &mut line_no)?,
            PcdDataFormat::Binary => Self::read_binary_points(reader, &header, &layout)?,
        };
        Ok(PcdData {
            header,
            cloud: PointCloud::from_points(points),
            normals,
        })
    }

    /// Read a PCD file that must carry normals
    pub fn read_normal_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<NormalPoint3f>> {
        let data = Self::read_pcd_file(path)?;
        let normals = data
            .normals
            .ok_or_else(|| IoError::format("PCD file has no normal_x/normal_y/normal_z fields"))?;
        PointCloud::from_points_and_normals(&data.cloud.points, &normals)
            .ok_or_else(|| Error::invalid_data("normal count does not match point count"))
    }

    /// Read the header up to and including the DATA line
    ///
    /// FIELDS and DATA are required. SIZE, TYPE and COUNT default to 4, F and
    /// 1. WIDTH defaults to POINTS and HEIGHT to 1.
    fn read_header<R: BufRead>(reader: &mut R, line_no: &mut usize) -> Result<PcdHeader> {
        let mut version = None;
        let mut names: Vec<String> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();
        let mut types: Vec<String> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        let mut width = None;
        let mut height = None;
        let mut viewpoint = DEFAULT_VIEWPOINT;
        let mut points: Option<usize> = None;

        let mut line = String::new();

        let data_format = loop {
            line.clear();
            *line_no += 1;
            if reader.read_line(&mut line)? == 0 {
                return Err(IoError::parse(*line_no, "unexpected end of file in PCD header").into());
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            let Some((&key, values)) = parts.split_first() else {
                continue;
            };
            if key.starts_with('#') {
                continue; // Skip comments
            }

            let n = *line_no;
            match key {
                "VERSION" => version = values.first().map(|v| v.to_string()),
                "FIELDS" => names = values.iter().map(|v| v.to_string()).collect(),
                "SIZE" => sizes = parse_all(values, n, "SIZE")?,
                "TYPE" => types = values.iter().map(|v| v.to_string()).collect(),
                "COUNT" => counts = parse_all(values, n, "COUNT")?,
                "WIDTH" => width = Some(parse_one(values, n, "WIDTH")?),
                "HEIGHT" => height = Some(parse_one(values, n, "HEIGHT")?),
                "POINTS" => points = Some(parse_one(values, n, "POINTS")?),
                "VIEWPOINT" => {
                    let parsed: Vec<f64> = parse_all(values, n, "VIEWPOINT")?;
                    match <[f64; 7]>::try_from(parsed.as_slice()) {
                        Ok(vp) => viewpoint = vp,
                        Err(_) => warn!(line = n, "ignoring VIEWPOINT without 7 values"),
                    }
                }
                "DATA" => match values.first().copied() {
                    Some("ascii") => break PcdDataFormat::Ascii,
                    Some("binary") => break PcdDataFormat::Binary,
                    Some(other) => {
                        return Err(IoError::format(format!("unsupported PCD DATA encoding '{}'", other)).into())
                    }
                    None => return Err(IoError::parse(n, "DATA without encoding").into()),
                },
                other => warn!(line = n, key = other, "ignoring unknown PCD header entry"),
            }
        };

        if names.is_empty() {
            return Err(IoError::format("missing FIELDS in PCD header").into());
        }

        let mut fields = Vec::with_capacity(names.len());
        for (i, name) in names.into_iter().enumerate() {
            let size = field_attr(&sizes, i, 4, "SIZE")?;
            let type_str = field_attr(&types, i, "F".to_string(), "TYPE")?;
            let count = field_attr(&counts, i, 1, "COUNT")?;
            let field_type = PcdFieldType::from_type_and_size(&type_str, size).ok_or_else(|| {
                IoError::format(format!("unknown field type/size combination: {}/{}", type_str, size))
            })?;
            fields.push(PcdField { name, field_type, count });
        }

        check_record_size(&fields)?;

        let height = height.unwrap_or(1);
        let width = match (width, points) {
            (Some(w), _) => w,
            (None, Some(p)) if height > 0 => p / height,
            _ => return Err(IoError::format("missing WIDTH and POINTS in PCD header").into()),
        };
        let total = width.checked_mul(height).ok_or_else(|| {
            IoError::format(format!("WIDTH ({}) * HEIGHT ({}) overflows", width, height))
        })?;
        if let Some(points) = points {
            if points != total {
                return Err(IoError::format(format!(
                    "POINTS ({}) doesn't match WIDTH * HEIGHT ({})",
                    points, total
                ))
                .into());
            }
        }

        Ok(PcdHeader {
            version: version.unwrap_or_else(|| "0.7".to_string()),
            fields,
            width,
            height,
            viewpoint,
            data_format,
        })
    }

    /// Read ASCII format points, one record per non-empty line
    fn read_ascii_points<R: BufRead>(
        reader: &mut R,
        header: &PcdHeader,
        layout: &Layout,
        line_no: &mut usize,
    ) -> Result<(Vec<Point3f>, Option<Vec<Normal3f>>)> {
        let expected = header.points();
        let values_per_point = header.values_per_point();
        let reserve = expected.min(PREALLOC_POINTS);
        let mut points = Vec::with_capacity(reserve);
        let mut normals = layout.normal.map(|_| Vec::with_capacity(reserve));

        let mut line = String::new();
        while points.len() < expected {
            line.clear();
            *line_no += 1;
            if reader.read_line(&mut line)? == 0 {
                return Err(IoError::parse(
                    *line_no,
                    format!("expected {} points, found {}", expected, points.len()),
                )
                .into());
            }

            let values: Vec<&str> = line.split_whitespace().collect();
            if values.is_empty() {
                continue;
            }
            if values.len() < values_per_point {
                return Err(IoError::parse(
                    *line_no,
                    format!("expected {} values, found {}", values_per_point, values.len()),
                )
                .into());
            }

            let n = *line_no;
            let read = |slots: &[FieldSlot; 3]| -> std::result::Result<[f32; 3], IoError> {
                let mut out = [0.0f32; 3];
                for (o, slot) in out.iter_mut().zip(slots) {
                    let token = values[slot.value];
                    *o = token
                        .parse::<f64>()
                        .map_err(|_| IoError::parse(n, format!("invalid number '{}'", token)))?
                        as f32;
                }
                Ok(out)
            };

            points.push(Point3f::from(read(&layout.xyz)?));
            if let (Some(normals), Some(slots)) = (normals.as_mut(), layout.normal.as_ref()) {
                normals.push(Normal3f::from(read(slots)?));
            }
        }

        Ok((points, normals))
    }

    /// Read little-endian binary records
    fn read_binary_points<R: Read>(
        reader: &mut R,
        header: &PcdHeader,
        layout: &Layout,
    ) -> Result<(Vec<Point3f>, Option<Vec<Normal3f>>)> {
        let expected = header.points();
        let mut record = vec![0u8; header.bytes_per_point()];
        let reserve = expected.min(PREALLOC_POINTS);
        let mut points = Vec::with_capacity(reserve);
        let mut normals = layout.normal.map(|_| Vec::with_capacity(reserve));

        let decode = |record: &[u8], slots: &[FieldSlot; 3]| -> [f32; 3] {
            (*slots).map(|slot| {
                let end = slot.byte + slot.field_type.size();
                slot.field_type.decode_le(&record[slot.byte..end]) as f32
            })
        };

        for _ in 0..expected {
            reader.read_exact(&mut record).map_err(IoError::Io)?;
            points.push(Point3f::from(decode(&record, &layout.xyz)));
            if let (Some(normals), Some(slots)) = (normals.as_mut(), layout.normal.as_ref()) {
                normals.push(Normal3f::from(decode(&record, slots)));
            }
        }

        Ok((points, normals))
    }
}

/// Reject field layouts whose per-point size overflows or exceeds
/// [`MAX_RECORD_BYTES`]
fn check_record_size(fields: &[PcdField]) -> std::result::Result<(), IoError> {
    let mut bytes = 0usize;
    for field in fields {
        bytes = field
            .count
            .checked_mul(field.field_type.size())
            .and_then(|b| bytes.checked_add(b))
            .filter(|&b| b <= MAX_RECORD_BYTES)
            .ok_or_else(|| {
                IoError::format(format!(
                    "point record larger than {} bytes at field '{}'",
                    MAX_RECORD_BYTES, field.name
                ))
            })?;
    }
    Ok(())
}

fn parse_one<T: std::str::FromStr>(values: &[&str], line: usize, key: &str) -> std::result::Result<T, IoError> {
    let first = values
        .first()
        .ok_or_else(|| IoError::parse(line, format!("{} without a value", key)))?;
    first
        .parse()
        .map_err(|_| IoError::parse(line, format!("invalid {} value: {}", key, first)))
}

fn parse_all<T: std::str::FromStr>(values: &[&str], line: usize, key: &str) -> std::result::Result<Vec<T>, IoError> {
    values
        .iter()
        .map(|v| {
            v.parse()
                .map_err(|_| IoError::parse(line, format!("invalid {} value: {}", key, v)))
        })
        .collect()
}

/// Per-field attribute, falling back to `default` when the line was absent
fn field_attr<T: Clone>(declared: &[T], i: usize, default: T, key: &str) -> std::result::Result<T, IoError> {
    if declared.is_empty() {
        return Ok(default);
    }
    declared
        .get(i)
        .cloned()
        .ok_or_else(|| IoError::format(format!("{} has fewer entries than FIELDS", key)))
}

/// PCD writer
pub struct PcdWriter;

impl PcdWriter {
    /// Write a point cloud with the given options
    pub fn write_with_options<P: AsRef<Path>>(
        cloud: &PointCloud<Point3f>,
        path: P,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        Self::write_grid(cloud, path.as_ref(), cloud.len(), 1, options)
    }

    /// Write an organized cloud of `height` rows by `width` columns
    ///
    /// Points are stored row-major; `width * height` must equal the number of
    /// points.
    pub fn write_organized<P: AsRef<Path>>(
        cloud: &PointCloud<Point3f>,
        path: P,
        height: usize,
        width: usize,
    ) -> Result<()> {
        if width * height != cloud.len() {
            return Err(Error::invalid_config(format!(
                "organized size {}x{} does not hold {} points",
                height,
                width,
                cloud.len()
            )));
        }
        Self::write_grid(cloud, path.as_ref(), width, height, &PcdWriteOptions::default())
    }

    /// Write points with normals as `x y z normal_x normal_y normal_z`
    pub fn write_normal_cloud<P: AsRef<Path>>(
        cloud: &PointCloud<NormalPoint3f>,
        path: P,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write_normal_cloud_to_writer(cloud, &mut writer, options)?;
        writer.flush()?;
        info!(path = %path.display(), points = cloud.len(), "saved PCD with normals");
        Ok(())
    }

    /// Write point cloud to writer with options
    pub fn write_to_writer<W: Write>(
        cloud: &PointCloud<Point3f>,
        writer: &mut W,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        let header = Self::header(options, xyz_fields(), cloud.len(), 1);
        Self::write_header(writer, &header)?;
        Self::write_records(writer, options.data_format, cloud.iter().map(|p| [p.x, p.y, p.z]))
    }

    /// Write a normal cloud to writer with options
    pub fn write_normal_cloud_to_writer<W: Write>(
        cloud: &PointCloud<NormalPoint3f>,
        writer: &mut W,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        let mut fields = xyz_fields();
        fields.extend(["normal_x", "normal_y", "normal_z"].map(PcdField::f32));
        let header = Self::header(options, fields, cloud.len(), 1);
        Self::write_header(writer, &header)?;
        Self::write_records(
            writer,
            options.data_format,
            cloud.iter().map(|p| {
                [p.position.x, p.position.y, p.position.z, p.normal.x, p.normal.y, p.normal.z]
            }),
        )
    }

    fn write_grid(
        cloud: &PointCloud<Point3f>,
        path: &Path,
        width: usize,
        height: usize,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let header = Self::header(options, xyz_fields(), width, height);
        Self::write_header(&mut writer, &header)?;
        Self::write_records(&mut writer, options.data_format, cloud.iter().map(|p| [p.x, p.y, p.z]))?;
        writer.flush()?;
        info!(path = %path.display(), points = cloud.len(), width, height, "saved PCD");
        Ok(())
    }

    fn header(options: &PcdWriteOptions, fields: Vec<PcdField>, width: usize, height: usize) -> PcdHeader {
        PcdHeader {
            version: options.version.clone(),
            fields,
            width,
            height,
            viewpoint: options.viewpoint.unwrap_or(DEFAULT_VIEWPOINT),
            data_format: options.data_format,
        }
    }

    /// Write PCD header
    fn write_header<W: Write>(writer: &mut W, header: &PcdHeader) -> Result<()> {
        writeln!(writer, "# .PCD v{} - Point Cloud Data file format", header.version)?;
        writeln!(writer, "VERSION {}", header.version)?;
        write!(writer, "FIELDS")?;
        for field in &header.fields {
            write!(writer, " {}", field.name)?;
        }
        writeln!(writer)?;

        write!(writer, "SIZE")?;
        for field in &header.fields {
            write!(writer, " {}", field.field_type.size())?;
        }
        writeln!(writer)?;

        write!(writer, "TYPE")?;
        for field in &header.fields {
            write!(writer, " {}", field.field_type.type_char())?;
        }
        writeln!(writer)?;

        write!(writer, "COUNT")?;
        for field in &header.fields {
            write!(writer, " {}", field.count)?;
        }
        writeln!(writer)?;

        writeln!(writer, "WIDTH {}", header.width)?;
        writeln!(writer, "HEIGHT {}", header.height)?;
        let vp = header.viewpoint;
        writeln!(writer, "VIEWPOINT {} {} {} {} {} {} {}", vp[0], vp[1], vp[2], vp[3], vp[4], vp[5], vp[6])?;
        writeln!(writer, "POINTS {}", header.points())?;

        let data_str = match header.data_format {
            PcdDataFormat::Ascii => "ascii",
            PcdDataFormat::Binary => "binary",
        };
        writeln!(writer, "DATA {}", data_str)?;

        Ok(())
    }

    /// Write one record per item; ASCII uses the shortest text that parses
    /// back to the same `f32`
    fn write_records<W: Write, const N: usize>(
        writer: &mut W,
        format: PcdDataFormat,
        records: impl Iterator<Item = [f32; N]>,
    ) -> Result<()> {
        for record in records {
            match format {
                PcdDataFormat::Ascii => {
                    for (i, value) in record.iter().enumerate() {
                        if i > 0 {
                            write!(writer, " ")?;
                        }
                        write!(writer, "{}", value)?;
                    }
                    writeln!(writer)?;
                }
                PcdDataFormat::Binary => {
                    for value in record {
                        writer.write_all(&value.to_le_bytes())?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn xyz_fields() -> Vec<PcdField> {
    ["x", "y", "z"].map(PcdField::f32).to_vec()
}

impl PointCloudReader for PcdReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
        Ok(Self::read_pcd_file(path)?.cloud)
    }
}

impl PointCloudWriter for PcdWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()> {
        Self::write_with_options(cloud, path, &PcdWriteOptions::default())
    }
}
