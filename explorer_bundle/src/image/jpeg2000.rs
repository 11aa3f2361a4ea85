//! JPEG 2000 tile encoding with OpenJPEG.
//!
//! Tiles are encoded as raw J2K codestreams of a single 8-bit grayscale component, the form
//! expected by TIFF readers for compression `34712`.

use std::ffi::c_void;
use std::ptr::NonNull;

use openjpeg_sys as opj;

const STREAM_CHUNK_SIZE: usize = 1 << 20;

/// The most wavelet decomposition levels used, further limited by the tile size.
const MAX_RESOLUTIONS: u32 = 6;

fn encode_error(message: &str) -> std::io::Error {
    std::io::Error::other(format!("JPEG 2000 encoding failed: {message}"))
}

struct Codec(NonNull<opj::opj_codec_t>);

impl Drop for Codec {
    fn drop(&mut self) {
        unsafe {
            // SAFETY: the codec was created by opj_create_compress and is destroyed once
            opj::opj_destroy_codec(self.0.as_ptr());
        }
    }
}

struct Image(NonNull<opj::opj_image_t>);

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            // SAFETY: the image was created by opj_image_create and is destroyed once
            opj::opj_image_destroy(self.0.as_ptr());
        }
    }
}

struct Stream(NonNull<opj::opj_stream_t>);

impl Drop for Stream {
    fn drop(&mut self) {
        unsafe {
            // SAFETY: the stream was created by opj_stream_create and is destroyed once
            opj::opj_stream_destroy(self.0.as_ptr());
        }
    }
}

/// The in-memory destination of an output stream.
#[derive(Default)]
struct Sink {
    bytes: Vec<u8>,
    position: usize,
}

impl Sink {
    fn seek(&mut self, position: usize) {
        if self.bytes.len() < position {
            self.bytes.resize(position, 0);
        }
        self.position = position;
    }
}

unsafe extern "C" fn sink_write(buffer: *mut c_void, len: usize, user_data: *mut c_void) -> usize {
    // SAFETY: user_data is the Sink registered with the stream, buffer holds len bytes
    let sink = unsafe { &mut *user_data.cast::<Sink>() };
    let data = unsafe { std::slice::from_raw_parts(buffer.cast::<u8>(), len) };
    let start = sink.position;
    sink.seek(start + len);
    sink.bytes[start..start + len].copy_from_slice(data);
    len
}

unsafe extern "C" fn sink_skip(offset: i64, user_data: *mut c_void) -> i64 {
    // SAFETY: user_data is the Sink registered with the stream
    let sink = unsafe { &mut *user_data.cast::<Sink>() };
    match isize::try_from(offset)
        .ok()
        .and_then(|offset| sink.position.checked_add_signed(offset))
    {
        Some(position) => {
            sink.seek(position);
            offset
        }
        None => -1,
    }
}

unsafe extern "C" fn sink_seek(position: i64, user_data: *mut c_void) -> opj::OPJ_BOOL {
    // SAFETY: user_data is the Sink registered with the stream
    let sink = unsafe { &mut *user_data.cast::<Sink>() };
    match usize::try_from(position) {
        Ok(position) => {
            sink.seek(position);
            1
        }
        Err(_) => 0,
    }
}

/// The number of resolution levels for a tile with shortest side `extent`.
fn resolutions(extent: usize) -> u32 {
    (usize::BITS - extent.leading_zeros()).clamp(1, MAX_RESOLUTIONS)
}

/// Encode `height` rows of `width` 8-bit samples as a J2K codestream.
///
/// A `ratio` above 1 is the target compression ratio of the irreversible 9/7 wavelet. A `ratio`
/// of 1 encodes losslessly with the reversible 5/3 wavelet.
///
/// # Errors
/// Returns an IO error if the samples do not match the shape or OpenJPEG fails.
pub(crate) fn encode_j2k(
    samples: &[u8],
    width: usize,
    height: usize,
    ratio: u16,
) -> Result<Vec<u8>, std::io::Error> {
    if samples.len() != width * height || samples.is_empty() {
        return Err(encode_error("sample count does not match the tile shape"));
    }
    let w = u32::try_from(width).map_err(|_| encode_error("tile is too wide"))?;
    let h = u32::try_from(height).map_err(|_| encode_error("tile is too high"))?;

    let mut component: opj::opj_image_cmptparm_t = unsafe {
        // SAFETY: the component parameters are plain integers
        std::mem::zeroed()
    };
    component.dx = 1;
    component.dy = 1;
    component.w = w;
    component.h = h;
    component.prec = 8;
    component.sgnd = 0;
    let image = NonNull::new(unsafe {
        // SAFETY: one valid component parameter set is passed
        opj::opj_image_create(1, &mut component, opj::COLOR_SPACE::OPJ_CLRSPC_GRAY)
    })
    .map(Image)
    .ok_or_else(|| encode_error("failed to create image"))?;
    unsafe {
        // SAFETY: the image has one component of w * h samples allocated by opj_image_create
        let raw = image.0.as_ptr();
        (*raw).x0 = 0;
        (*raw).y0 = 0;
        (*raw).x1 = w;
        (*raw).y1 = h;
        let data = (*(*raw).comps).data;
        if data.is_null() {
            return Err(encode_error("image component has no data"));
        }
        std::slice::from_raw_parts_mut(data, samples.len())
            .iter_mut()
            .zip(samples)
            .for_each(|(value, &sample)| *value = i32::from(sample));
    }

    let mut parameters: opj::opj_cparameters_t = unsafe {
        // SAFETY: the parameters are initialised by opj_set_default_encoder_parameters
        std::mem::zeroed()
    };
    unsafe {
        // SAFETY: parameters is a valid opj_cparameters_t
        opj::opj_set_default_encoder_parameters(&mut parameters);
    }
    parameters.tcp_numlayers = 1;
    parameters.cp_disto_alloc = 1;
    parameters.tcp_rates[0] = if ratio > 1 { f32::from(ratio) } else { 0.0 };
    parameters.irreversible = i32::from(ratio > 1);
    #[allow(clippy::cast_possible_wrap)]
    {
        parameters.numresolution = resolutions(width.min(height)) as i32;
    }

    let codec = NonNull::new(unsafe {
        // SAFETY: creating a codec has no preconditions
        opj::opj_create_compress(opj::CODEC_FORMAT::OPJ_CODEC_J2K)
    })
    .map(Codec)
    .ok_or_else(|| encode_error("failed to create codec"))?;
    let setup = unsafe {
        // SAFETY: codec, parameters and image are valid
        opj::opj_setup_encoder(codec.0.as_ptr(), &mut parameters, image.0.as_ptr())
    };
    if setup == 0 {
        return Err(encode_error("invalid encoder parameters"));
    }

    let mut sink = Sink::default();
    let stream = NonNull::new(unsafe {
        // SAFETY: creating an output stream has no preconditions
        opj::opj_stream_create(STREAM_CHUNK_SIZE, 0)
    })
    .map(Stream)
    .ok_or_else(|| encode_error("failed to create stream"))?;
    unsafe {
        // SAFETY: sink outlives the stream, which is dropped before sink is read
        opj::opj_stream_set_write_function(stream.0.as_ptr(), Some(sink_write));
        opj::opj_stream_set_skip_function(stream.0.as_ptr(), Some(sink_skip));
        opj::opj_stream_set_seek_function(stream.0.as_ptr(), Some(sink_seek));
        opj::opj_stream_set_user_data(
            stream.0.as_ptr(),
            std::ptr::from_mut(&mut sink).cast::<c_void>(),
            None,
        );
    }
    let encoded = unsafe {
        // SAFETY: codec, image and stream are valid and set up
        opj::opj_start_compress(codec.0.as_ptr(), image.0.as_ptr(), stream.0.as_ptr()) != 0
            && opj::opj_encode(codec.0.as_ptr(), stream.0.as_ptr()) != 0
            && opj::opj_end_compress(codec.0.as_ptr(), stream.0.as_ptr()) != 0
    };
    drop(stream);
    drop(codec);
    if !encoded {
        return Err(encode_error("codestream could not be written"));
    }
    Ok(sink.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOC: [u8; 2] = [0xFF, 0x4F];
    const SIZ: [u8; 2] = [0xFF, 0x51];
    const EOC: [u8; 2] = [0xFF, 0xD9];

    fn gradient(width: usize, height: usize) -> Vec<u8> {
        (0..width * height)
            .map(|i| u8::try_from((i % width) * 255 / width.max(1)).unwrap())
            .collect()
    }

    #[test]
    fn jpeg2000_resolutions() {
        assert_eq!(resolutions(1), 1);
        assert_eq!(resolutions(16), 5);
        assert_eq!(resolutions(31), 5);
        assert_eq!(resolutions(32), 6);
        assert_eq!(resolutions(1024), 6);
    }

    #[test]
    fn jpeg2000_codestream_markers() {
        let samples = gradient(64, 64);
        let encoded = encode_j2k(&samples, 64, 64, 10).unwrap();
        assert_eq!(encoded[..2], SOC);
        assert_eq!(encoded[2..4], SIZ);
        assert_eq!(encoded[encoded.len() - 2..], EOC);
        // Xsiz and Ysiz of the SIZ marker segment
        assert_eq!(encoded[8..12], 64u32.to_be_bytes());
        assert_eq!(encoded[12..16], 64u32.to_be_bytes());
    }

    #[test]
    fn jpeg2000_lossy_is_smaller() {
        let samples = gradient(128, 128);
        let lossless = encode_j2k(&samples, 128, 128, 1).unwrap();
        let lossy = encode_j2k(&samples, 128, 128, 40).unwrap();
        assert!(lossy.len() < lossless.len());
        assert!(lossy.len() <= samples.len() / 10);
    }

    #[test]
    fn jpeg2000_small_tile() {
        let encoded = encode_j2k(&[7; 16 * 16], 16, 16, 10).unwrap();
        assert_eq!(encoded[..2], SOC);
    }

    #[test]
    fn jpeg2000_shape_mismatch() {
        assert!(encode_j2k(&[0; 10], 4, 4, 10).is_err());
        assert!(encode_j2k(&[], 0, 0, 10).is_err());
    }
}
