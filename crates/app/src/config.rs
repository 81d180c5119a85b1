use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use video_ingest::CameraTuning;

use crate::camera::{encoding::DEFAULT_JPEG_QUALITY, CameraOptions};

pub const USAGE: &str = "Usage: hexacam [--device <uri>] [--port <n>] [--width <px>] \
[--height <px>] [--fps <n>] [--jpeg-quality <1-100>] [--serial <path>] [--no-serial] \
[--auth <user:pass>] [--cascade <path>] [--detect-on-start]\n\nPositional form is also \
supported: hexacam <device-uri>";

const DEFAULT_SERIAL_PATH: &str = "/dev/ttyUSB0";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub port: u16,
    pub jpeg_quality: i32,
    pub serial_path: Option<String>,
    pub auth: Option<AuthCredentials>,
    pub camera: CameraOptions,
}

impl ServeConfig {
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut device: Option<String> = None;
        let mut port: Option<u16> = None;
        let mut width: Option<i32> = None;
        let mut height: Option<i32> = None;
        let mut fps: Option<f64> = None;
        let mut jpeg_quality: Option<i32> = None;
        let mut serial_path: Option<String> = Some(DEFAULT_SERIAL_PATH.to_string());
        let mut auth: Option<AuthCredentials> = None;
        let mut cascade: Option<PathBuf> = None;
        let mut detect_on_start = false;
        let mut positional: Vec<String> = Vec::new();

        let mut idx = 1;
        while idx < args.len() {
            match args[idx].as_str() {
                "--device" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--device requires a value"))?
                        .clone();
                    device = Some(value);
                    idx += 1;
                }
                "--port" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--port requires a value"))?
                        .parse::<u16>()
                        .with_context(|| "--port must be a port number".to_string())?;
                    port = Some(value);
                    idx += 1;
                }
                "--width" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--width requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--width must be a positive integer".to_string())?;
                    if value <= 0 {
                        bail!("--width must be a positive integer");
                    }
                    width = Some(value);
                    idx += 1;
                }
                "--height" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--height requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--height must be a positive integer".to_string())?;
                    if value <= 0 {
                        bail!("--height must be a positive integer");
                    }
                    height = Some(value);
                    idx += 1;
                }
                "--fps" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--fps requires a value"))?
                        .parse::<f64>()
                        .with_context(|| "--fps must be a number".to_string())?;
                    if value <= 0.0 {
                        bail!("--fps must be greater than zero");
                    }
                    fps = Some(value);
                    idx += 1;
                }
                "--jpeg-quality" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--jpeg-quality requires a value"))?
                        .parse::<i32>()
                        .with_context(|| {
                            "--jpeg-quality must be an integer between 1 and 100".to_string()
                        })?;
                    if !(1..=100).contains(&value) {
                        bail!("--jpeg-quality must be an integer between 1 and 100");
                    }
                    jpeg_quality = Some(value);
                    idx += 1;
                }
                "--serial" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--serial requires a value"))?
                        .clone();
                    serial_path = Some(value);
                    idx += 1;
                }
                "--no-serial" => {
                    serial_path = None;
                    idx += 1;
                }
                "--auth" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--auth requires a value"))?;
                    let (username, password) = value
                        .split_once(':')
                        .ok_or_else(|| anyhow!("--auth must be <user:pass>"))?;
                    if username.is_empty() {
                        bail!("--auth must be <user:pass>");
                    }
                    auth = Some(AuthCredentials {
                        username: username.to_string(),
                        password: password.to_string(),
                    });
                    idx += 1;
                }
                "--cascade" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--cascade requires a value"))?
                        .clone();
                    cascade = Some(PathBuf::from(value));
                    idx += 1;
                }
                "--detect-on-start" => {
                    detect_on_start = true;
                    idx += 1;
                }
                arg if arg.starts_with('-') => {
                    bail!("Unrecognised flag: {arg}\n\n{USAGE}");
                }
                other => {
                    positional.push(other.to_string());
                    idx += 1;
                }
            }
        }

        let mut positional = positional.into_iter();
        if device.is_none() {
            device = positional.next();
        }
        if let Some(extra) = positional.next() {
            bail!("Unexpected argument: {extra}\n\n{USAGE}");
        }

        let defaults = CameraTuning::default();
        let tuning = CameraTuning {
            width: width.unwrap_or(defaults.width),
            height: height.unwrap_or(defaults.height),
            fps: fps.unwrap_or(defaults.fps),
        };

        Ok(Self {
            port: port.unwrap_or(5000),
            jpeg_quality: jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            serial_path,
            auth,
            camera: CameraOptions {
                device: device.unwrap_or_else(|| "0".to_string()),
                tuning,
                cascade,
                detect_on_start,
            },
        })
    }
}
